//! Tree entries, diff records and change events shared by the sync and diff subsystems

use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::validation::to_slash;

/// Kind of a filesystem node
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
	File,
	Directory,
}

/// A filesystem node, identified by its path relative to the tree root
///
/// Entries are rebuilt on every scan or event and never persisted.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Entry {
	pub relative_path: PathBuf,
	pub kind: EntryKind,
	pub size: u64,
	/// Last modification, seconds since the Unix epoch
	pub modified: u64,
}

impl Entry {
	pub fn from_metadata(relative_path: PathBuf, meta: &fs::Metadata) -> Self {
		let kind = if meta.is_dir() { EntryKind::Directory } else { EntryKind::File };
		let modified = meta
			.modified()
			.ok()
			.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
			.map(|d| d.as_secs())
			.unwrap_or(0);
		let size = if kind == EntryKind::File { meta.len() } else { 0 };
		Entry { relative_path, kind, size, modified }
	}

	/// Stat `root/relative_path`, following symlinks
	///
	/// Returns `Ok(None)` when nothing exists at that path.
	pub fn stat(root: &Path, relative_path: &Path) -> io::Result<Option<Self>> {
		match fs::metadata(root.join(relative_path)) {
			Ok(meta) => Ok(Some(Self::from_metadata(relative_path.to_path_buf(), &meta))),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub fn is_dir(&self) -> bool {
		self.kind == EntryKind::Directory
	}

	/// BLAKE3 hash of the file content, computed on demand
	///
	/// Directories have no content hash.
	pub fn content_hash(&self, root: &Path) -> io::Result<Option<String>> {
		if self.is_dir() {
			return Ok(None);
		}
		let mut file = fs::File::open(root.join(&self.relative_path))?;
		let mut hasher = blake3::Hasher::new();
		let mut buf = vec![0u8; 64 * 1024];
		loop {
			let n = file.read(&mut buf)?;
			if n == 0 {
				break;
			}
			hasher.update(&buf[..n]);
		}
		Ok(Some(hasher.finalize().to_hex().to_string()))
	}
}

/// Entry type on one side of a comparison
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
	File,
	Directory,
	Missing,
}

impl From<Option<EntryKind>> for EntryType {
	fn from(kind: Option<EntryKind>) -> Self {
		match kind {
			Some(EntryKind::File) => EntryType::File,
			Some(EntryKind::Directory) => EntryType::Directory,
			None => EntryType::Missing,
		}
	}
}

/// Outcome of comparing one relative path across two trees
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiffState {
	Equal,
	LeftOnly,
	RightOnly,
	Differs,
}

impl DiffState {
	pub fn swapped(self) -> Self {
		match self {
			DiffState::LeftOnly => DiffState::RightOnly,
			DiffState::RightOnly => DiffState::LeftOnly,
			other => other,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			DiffState::Equal => "equal",
			DiffState::LeftOnly => "left-only",
			DiffState::RightOnly => "right-only",
			DiffState::Differs => "differs",
		}
	}
}

/// One compared path. Produced by the comparator, never mutated afterwards.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRecord {
	/// `/`-separated path relative to both roots
	pub relative_path: String,
	pub name1: Option<String>,
	pub name2: Option<String>,
	pub path1: Option<PathBuf>,
	pub path2: Option<PathBuf>,
	pub type1: EntryType,
	pub type2: EntryType,
	pub state: DiffState,
	pub size1: Option<u64>,
	pub size2: Option<u64>,
	pub date1: Option<u64>,
	pub date2: Option<u64>,
	/// Set when one side could not be read; the walk continued regardless
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl DiffRecord {
	/// Build a record from the entries found under the two roots
	pub fn new(
		relative_path: &Path,
		left: Option<(&Path, &Entry)>,
		right: Option<(&Path, &Entry)>,
		state: DiffState,
	) -> Self {
		let name = relative_path.file_name().map(|n| n.to_string_lossy().into_owned());
		DiffRecord {
			relative_path: to_slash(relative_path),
			name1: left.and(name.clone()),
			name2: right.and(name),
			path1: left.map(|(root, e)| root.join(&e.relative_path)),
			path2: right.map(|(root, e)| root.join(&e.relative_path)),
			type1: left.map(|(_, e)| e.kind).into(),
			type2: right.map(|(_, e)| e.kind).into(),
			state,
			size1: left.map(|(_, e)| e.size),
			size2: right.map(|(_, e)| e.size),
			date1: left.map(|(_, e)| e.modified),
			date2: right.map(|(_, e)| e.modified),
			error: None,
		}
	}

	pub fn with_error(mut self, error: impl Into<String>) -> Self {
		self.error = Some(error.into());
		self
	}

	pub fn is_difference(&self) -> bool {
		self.state != DiffState::Equal
	}

	/// The same record seen from the other side
	pub fn swapped(&self) -> Self {
		DiffRecord {
			relative_path: self.relative_path.clone(),
			name1: self.name2.clone(),
			name2: self.name1.clone(),
			path1: self.path2.clone(),
			path2: self.path1.clone(),
			type1: self.type2,
			type2: self.type1,
			state: self.state.swapped(),
			size1: self.size2,
			size2: self.size1,
			date1: self.date2,
			date2: self.date1,
			error: self.error.clone(),
		}
	}
}

/// Normalized filesystem change
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum ChangeKind {
	Created,
	Modified,
	DeletedFile,
	DeletedDirectory,
}

impl ChangeKind {
	pub fn is_removal(self) -> bool {
		matches!(self, ChangeKind::DeletedFile | ChangeKind::DeletedDirectory)
	}

	/// Label used in the per-event sync log line
	pub fn label(self) -> &'static str {
		match self {
			ChangeKind::Created => "Added",
			ChangeKind::Modified => "Updated",
			ChangeKind::DeletedFile => "Removed",
			ChangeKind::DeletedDirectory => "Removed directory",
		}
	}
}

/// A change observed in the source tree, handed to the propagator exactly once
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ChangeEvent {
	pub kind: ChangeKind,
	pub relative_path: PathBuf,
}

impl ChangeEvent {
	pub fn new(kind: ChangeKind, relative_path: impl Into<PathBuf>) -> Self {
		ChangeEvent { kind, relative_path: relative_path.into() }
	}
}


// vim: ts=4
