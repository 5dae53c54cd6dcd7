//! Apply primitives for the mirror tree
//!
//! Every write goes through a temp file next to its destination followed by a
//! rename, so a reader never observes a partially-copied file. Removing an
//! absent entry is not an error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::exclusion::{PathFilter, TEMP_SUFFIX};
use crate::logging::*;
use crate::types::Entry;
use crate::validation::validate_relative_path;

/// Result of applying one change to the mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
	/// File content was written
	Copied,
	/// Mirror already matched the source
	Unchanged,
	/// Directory (and its filtered subtree) was copied
	CopiedDir { files: usize },
	/// Entry was removed from the mirror
	Removed,
	/// Nothing to remove
	Absent,
	/// Path is ignored, mirror left alone
	Ignored,
}

/// Counters of a recursive copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
	pub files: usize,
	pub dirs: usize,
	pub skipped: usize,
}

/// Bring `mirror_root/rel` in line with `source_root/rel`
///
/// A source that no longer exists removes the mirror entry instead.
pub async fn copy_entry(
	source_root: &Path,
	mirror_root: &Path,
	rel: &Path,
	filter: &PathFilter,
) -> Result<ApplyOutcome, SyncError> {
	validate_relative_path(rel)?;
	if filter.is_ignored(rel) {
		return Ok(ApplyOutcome::Ignored);
	}

	let source = source_root.join(rel);
	let target = mirror_root.join(rel);

	let meta = match tokio::fs::metadata(&source).await {
		Ok(meta) => meta,
		Err(e) if e.kind() == io::ErrorKind::NotFound => {
			debug!("Source {} vanished, removing mirror copy", source.display());
			return remove_entry(mirror_root, rel).await;
		}
		Err(e) => return Err(SyncError::io(&source, e)),
	};

	if meta.is_dir() {
		if is_file(&target).await {
			tokio::fs::remove_file(&target).await.map_err(|e| SyncError::io(&target, e))?;
		}
		let filter = filter.clone();
		let rel = rel.to_path_buf();
		let (src, dst) = (source.clone(), target.clone());
		let stats = tokio::task::spawn_blocking(move || copy_dir_filtered(&src, &dst, &rel, &filter))
			.await
			.map_err(|e| SyncError::fatal(format!("copy task for {} failed: {}", source.display(), e)))??;
		return Ok(ApplyOutcome::CopiedDir { files: stats.files });
	}

	if is_dir(&target).await {
		tokio::fs::remove_dir_all(&target).await.map_err(|e| SyncError::io(&target, e))?;
	} else if mirror_matches(source_root, mirror_root, rel, meta.len()).await {
		return Ok(ApplyOutcome::Unchanged);
	}

	write_file_atomic(&source, &target).await?;
	Ok(ApplyOutcome::Copied)
}

/// Remove `mirror_root/rel`, whatever kind it is
pub async fn remove_entry(mirror_root: &Path, rel: &Path) -> Result<ApplyOutcome, SyncError> {
	validate_relative_path(rel)?;
	let target = mirror_root.join(rel);

	let meta = match tokio::fs::symlink_metadata(&target).await {
		Ok(meta) => meta,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ApplyOutcome::Absent),
		Err(e) => return Err(SyncError::io(&target, e)),
	};

	let result = if meta.is_dir() {
		tokio::fs::remove_dir_all(&target).await
	} else {
		tokio::fs::remove_file(&target).await
	};

	match result {
		Ok(()) => Ok(ApplyOutcome::Removed),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ApplyOutcome::Absent),
		Err(e) => Err(SyncError::io(&target, e)),
	}
}

/// Copy `source` over `target` through a sibling temp file
pub async fn write_file_atomic(source: &Path, target: &Path) -> Result<(), SyncError> {
	if let Some(parent) = target.parent() {
		tokio::fs::create_dir_all(parent).await.map_err(|e| SyncError::io(parent, e))?;
	}
	let tmp = temp_path(target);

	if let Err(e) = tokio::fs::copy(source, &tmp).await {
		let _ = tokio::fs::remove_file(&tmp).await;
		return Err(SyncError::io(source, e));
	}
	if let Err(e) = tokio::fs::rename(&tmp, target).await {
		let _ = tokio::fs::remove_file(&tmp).await;
		return Err(SyncError::io(target, e));
	}
	Ok(())
}

/// Sibling temp file name: `.name.<uuid>.themesync-tmp`
fn temp_path(target: &Path) -> PathBuf {
	let name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
	target.with_file_name(format!(".{}.{}{}", name, uuid::Uuid::new_v4().simple(), TEMP_SUFFIX))
}

async fn is_dir(path: &Path) -> bool {
	tokio::fs::symlink_metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

async fn is_file(path: &Path) -> bool {
	tokio::fs::symlink_metadata(path).await.map(|m| !m.is_dir()).unwrap_or(false)
}

/// Same size and same BLAKE3 content hash on both sides
async fn mirror_matches(source_root: &Path, mirror_root: &Path, rel: &Path, source_len: u64) -> bool {
	match tokio::fs::metadata(mirror_root.join(rel)).await {
		Ok(meta) if meta.is_file() && meta.len() == source_len => {}
		_ => return false,
	}

	let (src_root, dst_root, rel) = (source_root.to_path_buf(), mirror_root.to_path_buf(), rel.to_path_buf());
	let hashes = tokio::task::spawn_blocking(move || -> io::Result<bool> {
		let hash = |root: &Path| -> io::Result<Option<String>> {
			match Entry::stat(root, &rel)? {
				Some(entry) => entry.content_hash(root),
				None => Ok(None),
			}
		};
		let (a, b) = (hash(&src_root)?, hash(&dst_root)?);
		Ok(a.is_some() && a == b)
	})
	.await;

	matches!(hashes, Ok(Ok(true)))
}

/// One-shot bulk copy: replace `dst` with the filtered contents of `src`
pub fn copy_tree(src: &Path, dst: &Path, filter: &PathFilter) -> Result<CopyStats, SyncError> {
	if !src.is_dir() {
		return Err(SyncError::missing(src, "The source folder doesn't seem to exist"));
	}

	if dst.exists() {
		info!("Cleaning folder: {}", dst.display());
		let result = if dst.is_dir() { fs::remove_dir_all(dst) } else { fs::remove_file(dst) };
		result.map_err(|e| SyncError::io(dst, e))?;
	}

	info!("Copy files from {}", src.display());
	copy_dir_filtered(src, dst, Path::new(""), filter)
}

/// Recursively copy `src` into `dst`, merging with what is there
///
/// `rel` is the relative path of `src` inside the source tree, used for
/// filtering.
pub fn copy_dir_filtered(
	src: &Path,
	dst: &Path,
	rel: &Path,
	filter: &PathFilter,
) -> Result<CopyStats, SyncError> {
	let mut stats = CopyStats::default();
	fs::create_dir_all(dst).map_err(|e| SyncError::io(dst, e))?;
	stats.dirs += 1;

	let entries = fs::read_dir(src).map_err(|e| SyncError::io(src, e))?;
	for entry in entries {
		let entry = entry.map_err(|e| SyncError::io(src, e))?;
		let name = entry.file_name();
		let child_rel = rel.join(&name);
		if filter.is_ignored(&child_rel) {
			stats.skipped += 1;
			continue;
		}

		let from = entry.path();
		let to = dst.join(&name);
		let meta = fs::metadata(&from).map_err(|e| SyncError::io(&from, e))?;
		if meta.is_dir() {
			let sub = copy_dir_filtered(&from, &to, &child_rel, filter)?;
			stats.files += sub.files;
			stats.dirs += sub.dirs;
			stats.skipped += sub.skipped;
		} else {
			if to.is_dir() {
				fs::remove_dir_all(&to).map_err(|e| SyncError::io(&to, e))?;
			}
			let tmp = temp_path(&to);
			if let Err(e) = fs::copy(&from, &tmp).and_then(|_| fs::rename(&tmp, &to)) {
				let _ = fs::remove_file(&tmp);
				return Err(SyncError::io(&from, e));
			}
			stats.files += 1;
		}
	}

	Ok(stats)
}


// vim: ts=4
