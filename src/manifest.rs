//! Version manifest of the mirrored theme

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::SyncError;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
	#[serde(default)]
	pub version: Option<String>,
}

/// What `check` found in the mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestStatus {
	Missing(PathBuf),
	Unversioned,
	Version(String),
}

impl Manifest {
	pub fn parse(text: &str) -> Result<Self, SyncError> {
		serde_json::from_str(text)
			.map_err(|e| SyncError::InvalidConfig { message: format!("Malformed {}: {}", MANIFEST_FILE, e) })
	}
}

/// Read `<mirror>/manifest.json` and report the Atlas UI version it names
pub fn check_manifest(mirror_root: &Path) -> Result<ManifestStatus, SyncError> {
	let path = mirror_root.join(MANIFEST_FILE);
	let text = match std::fs::read_to_string(&path) {
		Ok(text) => text,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ManifestStatus::Missing(path)),
		Err(e) => return Err(SyncError::io(&path, e)),
	};

	match Manifest::parse(&text)?.version.map(|v| v.trim().to_string()) {
		Some(v) if !v.is_empty() => Ok(ManifestStatus::Version(v)),
		_ => Ok(ManifestStatus::Unversioned),
	}
}


// vim: ts=4
