/// Comparator and mirror properties over real files
///
/// Tests verify:
/// 1. Comparing in both directions gives mirrored states
/// 2. Modification times never make two files differ
/// 3. Applying the same change twice leaves the mirror unchanged
/// 4. The written report is a stable JSON array
/// 5. Unreadable entries and failed writes are reported, not fatal
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use themesync::compare::{compare, CompareOptions, CompareSummary};
use themesync::exclusion::NameFilter;
use themesync::mirror::{copy_entry, copy_tree, remove_entry, ApplyOutcome};
use themesync::report::{DiffReportBuilder, ReportOutcome};
use themesync::{DiffState, EntryType, PathFilter, SyncError};

fn create_file(dir: &Path, name: &str, content: &str) {
	let path = dir.join(name);
	fs::create_dir_all(path.parent().unwrap()).unwrap();
	fs::write(&path, content).unwrap();
}

fn filter() -> PathFilter {
	PathFilter::new(&["node_modules".to_string()]).unwrap()
}

// ===================================================================
// COMPARATOR
// ===================================================================

#[test]
fn test_compare_is_symmetric() {
	let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
	create_file(a.path(), "same.txt", "x");
	create_file(b.path(), "same.txt", "x");
	create_file(a.path(), "changed.txt", "left");
	create_file(b.path(), "changed.txt", "right!");
	create_file(a.path(), "only-left/inner.txt", "1");
	create_file(b.path(), "only-right.txt", "2");
	create_file(a.path(), "kind", "file here");
	fs::create_dir_all(b.path().join("kind")).unwrap();

	let forward = compare(a.path(), b.path(), &CompareOptions::default()).unwrap();
	let backward = compare(b.path(), a.path(), &CompareOptions::default()).unwrap();

	assert_eq!(forward.len(), backward.len());
	for (f, r) in forward.iter().zip(&backward) {
		assert_eq!(f.relative_path, r.relative_path);
		assert_eq!(f.state, r.state.swapped(), "state of {}", f.relative_path);
		assert_eq!(f.type1, r.type2);
		assert_eq!(f.type2, r.type1);
	}

	let summary = CompareSummary::from_records(&forward);
	assert_eq!(summary.left_only, 2); // only-left, only-left/inner.txt
	assert_eq!(summary.right_only, 1);
	assert_eq!(summary.differs, 2); // changed.txt, kind
}

#[test]
fn test_mtime_is_ignored() {
	let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
	create_file(a.path(), "a.txt", "hi");
	create_file(b.path(), "a.txt", "hi");
	set_file_mtime(a.path().join("a.txt"), FileTime::from_unix_time(1_000_000, 0)).unwrap();
	set_file_mtime(b.path().join("a.txt"), FileTime::from_unix_time(2_000_000, 0)).unwrap();

	let records = compare(a.path(), b.path(), &CompareOptions::default()).unwrap();
	assert_eq!(records.len(), 1);
	assert_eq!(records[0].state, DiffState::Equal);
}

#[test]
fn test_same_size_different_content() {
	let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
	create_file(a.path(), "a.txt", "abc");
	create_file(b.path(), "a.txt", "abd");

	let records = compare(a.path(), b.path(), &CompareOptions::default()).unwrap();
	assert_eq!(records[0].state, DiffState::Differs);

	// size-only comparison cannot tell them apart
	let size_only = CompareOptions { compare_content: false, ..CompareOptions::default() };
	let records = compare(a.path(), b.path(), &size_only).unwrap();
	assert_eq!(records[0].state, DiffState::Equal);
}

#[test]
fn test_exclude_filter_skips_names() {
	let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
	create_file(a.path(), ".hidden/config", "x");
	create_file(a.path(), "fonts/icons.woff2", "bin");
	create_file(a.path(), "main.css.map", "{}");
	create_file(b.path(), "fonts/readme.txt", "fonts");

	let options = CompareOptions {
		exclude_filter: NameFilter::parse(themesync::exclusion::DEFAULT_EXCLUDE_FILTER).unwrap(),
		..CompareOptions::default()
	};
	let records = compare(a.path(), b.path(), &options).unwrap();
	let paths: Vec<&str> = records.iter().map(|r| r.relative_path.as_str()).collect();

	assert_eq!(paths, vec!["fonts", "fonts/readme.txt"]);
	assert_eq!(records[1].state, DiffState::RightOnly);
	assert_eq!(records[1].type1, EntryType::Missing);
}

// ===================================================================
// MIRROR
// ===================================================================

#[tokio::test]
async fn test_copy_is_idempotent() {
	let (src, dst) = (TempDir::new().unwrap(), TempDir::new().unwrap());
	create_file(src.path(), "a.txt", "hi");
	let rel = Path::new("a.txt");

	let first = copy_entry(src.path(), dst.path(), rel, &filter()).await.unwrap();
	let second = copy_entry(src.path(), dst.path(), rel, &filter()).await.unwrap();

	assert_eq!(first, ApplyOutcome::Copied);
	assert_eq!(second, ApplyOutcome::Unchanged);
	assert_eq!(fs::read_to_string(dst.path().join("a.txt")).unwrap(), "hi");
}

#[tokio::test]
async fn test_remove_is_idempotent() {
	let dst = TempDir::new().unwrap();
	create_file(dst.path(), "sub/deep/c.txt", "x");

	assert_eq!(remove_entry(dst.path(), Path::new("sub")).await.unwrap(), ApplyOutcome::Removed);
	assert_eq!(remove_entry(dst.path(), Path::new("sub")).await.unwrap(), ApplyOutcome::Absent);
	assert!(!dst.path().join("sub").exists());
}

#[test]
fn test_copy_tree_leaves_no_temp_files() {
	let (src, dst) = (TempDir::new().unwrap(), TempDir::new().unwrap());
	create_file(src.path(), "a.txt", "hi");
	create_file(src.path(), "sub/b.txt", "x");
	let mirror = dst.path().join("theme");

	copy_tree(src.path(), &mirror, &filter()).unwrap();

	for dir in [mirror.clone(), mirror.join("sub")] {
		for entry in fs::read_dir(dir).unwrap() {
			let name = entry.unwrap().file_name().to_string_lossy().into_owned();
			assert!(!name.ends_with(".themesync-tmp"), "leftover {}", name);
		}
	}
}

#[test]
fn test_copy_tree_mirrors_editor_and_os_files() {
	let tmp = TempDir::new().unwrap();
	let (src, mirror) = (tmp.path().join("src"), tmp.path().join("theme"));
	create_file(&src, "a.txt", "hi");
	create_file(&src, "Thumbs.db", "thumbs");
	create_file(&src, "notes~", "backup");
	create_file(&src, "session.swp", "swap");
	let filter = PathFilter::new(&["node_modules".to_string(), ".svn".to_string()]).unwrap();

	copy_tree(&src, &mirror, &filter).unwrap();

	assert_eq!(fs::read_to_string(mirror.join("notes~")).unwrap(), "backup");
	let records = compare(&src, &mirror, &CompareOptions::default()).unwrap();
	assert_eq!(CompareSummary::from_records(&records).differences(), 0);
}

// ===================================================================
// ERROR PATHS
// ===================================================================

#[cfg(unix)]
#[test]
fn test_unreadable_entry_is_annotated_and_walk_continues() {
	let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
	create_file(a.path(), "a.txt", "x");
	create_file(b.path(), "a.txt", "x");
	create_file(a.path(), "z.txt", "left");
	create_file(b.path(), "z.txt", "right");
	std::os::unix::fs::symlink(a.path().join("gone"), a.path().join("broken")).unwrap();

	let records = compare(a.path(), b.path(), &CompareOptions::default()).unwrap();
	let paths: Vec<&str> = records.iter().map(|r| r.relative_path.as_str()).collect();
	assert_eq!(paths, vec!["a.txt", "broken", "z.txt"]);

	assert_eq!(records[1].state, DiffState::LeftOnly);
	assert!(records[1].error.is_some());
	// siblings on both sides of the bad entry are still compared
	assert_eq!(records[0].state, DiffState::Equal);
	assert_eq!(records[2].state, DiffState::Differs);
	assert!(records[2].error.is_none());
}

#[tokio::test]
async fn test_vanished_file_gets_empty_content() {
	let tmp = TempDir::new().unwrap();
	let (left, right) = (tmp.path().join("atlasui"), tmp.path().join("theme"));
	create_file(&left, "main.scss", "a {}");
	create_file(&right, "main.scss", "b {}");
	create_file(&right, "extra.scss", "c {}");

	let records = compare(&left, &right, &CompareOptions::default()).unwrap();
	fs::remove_file(left.join("main.scss")).unwrap();
	let report = DiffReportBuilder::new(tmp.path().join("diff/diff.json")).build(records).await;

	assert_eq!(report.len(), 2);
	let main = report.entries.iter().find(|e| e.record.relative_path == "main.scss").unwrap();
	assert_eq!(main.file1.as_deref(), Some(""));
	assert_eq!(main.file2.as_deref(), Some("b {}"));
	let extra = report.entries.iter().find(|e| e.record.relative_path == "extra.scss").unwrap();
	assert_eq!(extra.file2.as_deref(), Some("c {}"));
}

fn leftover_temp_files(dir: &Path) -> Vec<String> {
	fs::read_dir(dir)
		.unwrap()
		.map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
		.filter(|name| name.ends_with(".themesync-tmp"))
		.collect()
}

#[tokio::test]
async fn test_failed_write_keeps_previous_report() {
	let tmp = TempDir::new().unwrap();
	let (left, right) = (tmp.path().join("a"), tmp.path().join("b"));
	create_file(&left, "x.txt", "one");
	fs::create_dir_all(&right).unwrap();
	let diff_dir = tmp.path().join("diff");
	let report_path = diff_dir.join("diff.json");

	let records = compare(&left, &right, &CompareOptions::default()).unwrap();
	DiffReportBuilder::new(&report_path).build_and_write(records).await.unwrap();
	let previous = fs::read(&report_path).unwrap();

	// the report cannot replace a non-empty directory
	let blocked = diff_dir.join("blocked.json");
	create_file(&blocked, "keep.txt", "kept");
	create_file(&left, "y.txt", "two");
	let records = compare(&left, &right, &CompareOptions::default()).unwrap();
	let result = DiffReportBuilder::new(&blocked).build_and_write(records).await;
	assert!(matches!(result, Err(SyncError::ReportWrite { .. })));
	assert_eq!(fs::read_to_string(blocked.join("keep.txt")).unwrap(), "kept");

	// a report nested under the existing file cannot even get its directory
	let records = compare(&left, &right, &CompareOptions::default()).unwrap();
	let result = DiffReportBuilder::new(report_path.join("nested.json")).build_and_write(records).await;
	assert!(matches!(result, Err(SyncError::ReportWrite { .. })));

	assert_eq!(fs::read(&report_path).unwrap(), previous);
	assert!(leftover_temp_files(&diff_dir).is_empty());
}

// ===================================================================
// REPORT
// ===================================================================

#[tokio::test]
async fn test_report_round_trip_on_disk() {
	let tmp = TempDir::new().unwrap();
	let (left, right) = (tmp.path().join("atlasui"), tmp.path().join("theme"));
	create_file(&left, "main.scss", "a {}");
	create_file(&right, "main.scss", "b {}");
	create_file(&right, "custom.scss", "c {}");
	let report_path = tmp.path().join("diff/diff.json");

	let records = compare(&left, &right, &CompareOptions::default()).unwrap();
	let outcome = DiffReportBuilder::new(&report_path).build_and_write(records).await.unwrap();
	assert_eq!(outcome, ReportOutcome::Written { path: report_path.clone(), differences: 2 });

	let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
	let entries = json.as_array().unwrap();
	assert_eq!(entries.len(), 2);
	assert_eq!(entries[0]["relativePath"], "custom.scss");
	assert_eq!(entries[0]["state"], "right-only");
	assert_eq!(entries[0]["type1"], "missing");
	assert!(entries[0].get("file1").is_none());
	assert_eq!(entries[0]["file2"], "c {}");
	assert_eq!(entries[1]["state"], "differs");
	assert_eq!(entries[1]["file1"], "a {}");
}

#[tokio::test]
async fn test_no_differences_writes_nothing() {
	let tmp = TempDir::new().unwrap();
	let (left, right) = (tmp.path().join("a"), tmp.path().join("b"));
	create_file(&left, "x.txt", "same");
	create_file(&right, "x.txt", "same");
	let report_path = tmp.path().join("diff/diff.json");

	let records = compare(&left, &right, &CompareOptions::default()).unwrap();
	let outcome = DiffReportBuilder::new(&report_path).build_and_write(records).await.unwrap();

	assert_eq!(outcome, ReportOutcome::NoDifferences);
	assert!(!report_path.exists());
}

// vim: ts=4
