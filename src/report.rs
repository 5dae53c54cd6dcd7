//! Diff report: comparator output enriched with file contents, persisted as JSON

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::exclusion::TEMP_SUFFIX;
use crate::logging::*;
use crate::types::{DiffRecord, EntryType};

/// Concurrent file reads while enriching a report
const READ_CONCURRENCY: usize = 16;

/// A non-equal record plus the text of each file side
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
	#[serde(flatten)]
	pub record: DiffRecord,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub file1: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub file2: Option<String>,
}

/// Ordered report, serialized as a JSON array
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct DiffReport {
	pub entries: Vec<ReportEntry>,
}

impl DiffReport {
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Pretty JSON with 4-space indentation, fields in declaration order
	pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
		let mut out = Vec::new();
		let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
		let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
		self.serialize(&mut serializer)?;
		Ok(out)
	}
}

/// What happened to the report file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
	/// Nothing differs, no file was written
	NoDifferences,
	Written { path: PathBuf, differences: usize },
}

pub struct DiffReportBuilder {
	report_path: PathBuf,
}

impl DiffReportBuilder {
	pub fn new(report_path: impl Into<PathBuf>) -> Self {
		DiffReportBuilder { report_path: report_path.into() }
	}

	/// Keep non-equal records and attach the content of their file sides
	///
	/// Unreadable files get an empty string and a warning; the report is
	/// never aborted because of a single file.
	pub async fn build(&self, records: Vec<DiffRecord>) -> DiffReport {
		let entries = stream::iter(records.into_iter().filter(DiffRecord::is_difference))
			.map(|record| async move {
				let file1 = read_side(record.type1, record.path1.as_deref()).await;
				let file2 = read_side(record.type2, record.path2.as_deref()).await;
				ReportEntry { record, file1, file2 }
			})
			.buffered(READ_CONCURRENCY)
			.collect::<Vec<_>>()
			.await;

		DiffReport { entries }
	}

	/// Persist the report atomically: temp file in the same directory, then rename
	///
	/// On failure the temp file is removed and a previous report stays as it was.
	pub async fn write(&self, report: &DiffReport) -> Result<(), SyncError> {
		let report_err = |e: Box<dyn std::error::Error + Send + Sync>| SyncError::ReportWrite {
			path: self.report_path.clone(),
			source: e,
		};

		let json = report.to_json().map_err(|e| report_err(Box::new(e)))?;
		let dir = match self.report_path.parent() {
			Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
			_ => PathBuf::from("."),
		};
		tokio::fs::create_dir_all(&dir).await.map_err(|e| report_err(Box::new(e)))?;

		let file_name = self
			.report_path
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_else(|| "diff.json".to_string());
		let tmp = dir.join(format!(".{}.{}{}", file_name, uuid::Uuid::new_v4().simple(), TEMP_SUFFIX));

		if let Err(e) = tokio::fs::write(&tmp, &json).await {
			let _ = tokio::fs::remove_file(&tmp).await;
			return Err(report_err(Box::new(e)));
		}
		if let Err(e) = tokio::fs::rename(&tmp, &self.report_path).await {
			let _ = tokio::fs::remove_file(&tmp).await;
			return Err(report_err(Box::new(e)));
		}

		info!("Written diff output to: {}", self.report_path.display());
		Ok(())
	}

	/// Build and persist; an empty difference set writes nothing
	pub async fn build_and_write(&self, records: Vec<DiffRecord>) -> Result<ReportOutcome, SyncError> {
		let report = self.build(records).await;
		if report.is_empty() {
			return Ok(ReportOutcome::NoDifferences);
		}
		self.write(&report).await?;
		Ok(ReportOutcome::Written { path: self.report_path.clone(), differences: report.len() })
	}
}

async fn read_side(kind: EntryType, path: Option<&Path>) -> Option<String> {
	if kind != EntryType::File {
		return None;
	}
	let path = path?;
	match tokio::fs::read(path).await {
		Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
		Err(e) => {
			warn!("Error reading {}: {}", path.display(), e);
			Some(String::new())
		}
	}
}

/// Reduced console output of a comparison: one line per difference
pub fn render_listing(records: &[DiffRecord]) -> String {
	let mut out = String::new();
	for record in records.iter().filter(|r| r.is_difference()) {
		out.push_str(&format!("{:<10}  {}", record.state.as_str(), record.relative_path));
		if let Some(error) = &record.error {
			out.push_str(&format!("  ({})", error));
		}
		out.push('\n');
	}
	out
}


// vim: ts=4
