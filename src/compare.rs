//! Structural and content comparison of two directory trees
//!
//! The walk enumerates the union of relative paths of both trees in
//! component-wise lexicographic order. Directories are equal when both exist;
//! their children are compared separately. Files are compared by size and,
//! when enabled, byte by byte. A hash is never used to decide equality.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::exclusion::NameFilter;
use crate::logging::*;
use crate::types::{DiffRecord, DiffState, Entry, EntryKind};

const COMPARE_BUF_SIZE: usize = 64 * 1024;

/// Comparator settings
#[derive(Debug, Clone)]
pub struct CompareOptions {
	/// Files of different size are different
	pub compare_size: bool,
	/// Compare contents of files of equal size
	pub compare_content: bool,
	/// Names skipped entirely (never emitted, never recursed into)
	pub exclude_filter: NameFilter,
}

impl Default for CompareOptions {
	fn default() -> Self {
		CompareOptions { compare_size: true, compare_content: true, exclude_filter: NameFilter::none() }
	}
}

/// Counts per diff state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareSummary {
	pub equal: usize,
	pub left_only: usize,
	pub right_only: usize,
	pub differs: usize,
}

impl CompareSummary {
	pub fn from_records(records: &[DiffRecord]) -> Self {
		let mut summary = CompareSummary::default();
		for record in records {
			match record.state {
				DiffState::Equal => summary.equal += 1,
				DiffState::LeftOnly => summary.left_only += 1,
				DiffState::RightOnly => summary.right_only += 1,
				DiffState::Differs => summary.differs += 1,
			}
		}
		summary
	}

	pub fn differences(&self) -> usize {
		self.left_only + self.right_only + self.differs
	}
}

type Listing = BTreeMap<OsString, io::Result<Entry>>;

/// Compare `left` against `right` and return one record per compared path
pub fn compare(
	left: &Path,
	right: &Path,
	options: &CompareOptions,
) -> Result<Vec<DiffRecord>, SyncError> {
	Comparator { left_root: left, right_root: right, options }.run()
}

struct Comparator<'a> {
	left_root: &'a Path,
	right_root: &'a Path,
	options: &'a CompareOptions,
}

impl<'a> Comparator<'a> {
	fn run(&self) -> Result<Vec<DiffRecord>, SyncError> {
		for root in [self.left_root, self.right_root] {
			if !root.is_dir() {
				return Err(SyncError::missing(root, "Both trees must exist before comparing"));
			}
		}

		let root = Path::new("");
		let left = list_dir(self.left_root, root).map_err(|e| SyncError::io(self.left_root, e))?;
		let right = list_dir(self.right_root, root).map_err(|e| SyncError::io(self.right_root, e))?;

		let mut records = Vec::new();
		self.walk(root, Some(&left), Some(&right), &mut records);
		records.sort_by(|a, b| Path::new(&a.relative_path).cmp(Path::new(&b.relative_path)));

		debug!(
			"Compared {} and {}: {} paths",
			self.left_root.display(),
			self.right_root.display(),
			records.len()
		);
		Ok(records)
	}

	fn walk(
		&self,
		rel: &Path,
		left: Option<&Listing>,
		right: Option<&Listing>,
		out: &mut Vec<DiffRecord>,
	) {
		let names: BTreeSet<&OsString> =
			left.into_iter().chain(right).flat_map(|listing| listing.keys()).collect();

		for name in names {
			let child = rel.join(name);
			if self.options.exclude_filter.is_excluded(&child) {
				continue;
			}

			let l = left.and_then(|listing| listing.get(name));
			let r = right.and_then(|listing| listing.get(name));

			match (l, r) {
				(Some(Ok(a)), Some(Ok(b))) => self.compare_both(&child, a, b, out),
				(Some(Ok(a)), None) => self.one_sided(&child, a, true, out),
				(None, Some(Ok(b))) => self.one_sided(&child, b, false, out),
				(l, r) => self.unreadable(&child, l, r, out),
			}
		}
	}

	fn compare_both(&self, rel: &Path, a: &Entry, b: &Entry, out: &mut Vec<DiffRecord>) {
		let sides = (Some((self.left_root, a)), Some((self.right_root, b)));

		if a.kind != b.kind {
			out.push(DiffRecord::new(rel, sides.0, sides.1, DiffState::Differs));
			// the directory side's contents exist on that side only
			if a.is_dir() {
				self.descend_one_sided(rel, true, out);
			} else {
				self.descend_one_sided(rel, false, out);
			}
			return;
		}

		match a.kind {
			EntryKind::Directory => {
				let left = list_dir(self.left_root, rel);
				let right = list_dir(self.right_root, rel);
				match (left, right) {
					(Ok(left), Ok(right)) => {
						out.push(DiffRecord::new(rel, sides.0, sides.1, DiffState::Equal));
						self.walk(rel, Some(&left), Some(&right), out);
					}
					(left, right) => {
						let error = left.err().or(right.err()).map(|e| e.to_string()).unwrap_or_default();
						warn!("Cannot list {}: {}", rel.display(), error);
						out.push(
							DiffRecord::new(rel, sides.0, sides.1, DiffState::Differs).with_error(error),
						);
					}
				}
			}
			EntryKind::File => {
				let record = match self.files_equal(rel, a, b) {
					Ok(true) => DiffRecord::new(rel, sides.0, sides.1, DiffState::Equal),
					Ok(false) => DiffRecord::new(rel, sides.0, sides.1, DiffState::Differs),
					Err(e) => {
						warn!("Cannot compare {}: {}", rel.display(), e);
						DiffRecord::new(rel, sides.0, sides.1, DiffState::Differs).with_error(e.to_string())
					}
				};
				out.push(record);
			}
		}
	}

	fn files_equal(&self, rel: &Path, a: &Entry, b: &Entry) -> io::Result<bool> {
		if self.options.compare_size && a.size != b.size {
			return Ok(false);
		}
		if !self.options.compare_content {
			return Ok(true);
		}
		contents_equal(&self.left_root.join(rel), &self.right_root.join(rel))
	}

	fn one_sided(&self, rel: &Path, entry: &Entry, is_left: bool, out: &mut Vec<DiffRecord>) {
		let root = if is_left { self.left_root } else { self.right_root };
		let (state, l, r) = if is_left {
			(DiffState::LeftOnly, Some((root, entry)), None)
		} else {
			(DiffState::RightOnly, None, Some((root, entry)))
		};
		out.push(DiffRecord::new(rel, l, r, state));
		if entry.is_dir() {
			self.descend_one_sided(rel, is_left, out);
		}
	}

	fn descend_one_sided(&self, rel: &Path, is_left: bool, out: &mut Vec<DiffRecord>) {
		let root = if is_left { self.left_root } else { self.right_root };
		match list_dir(root, rel) {
			Ok(listing) => {
				if is_left {
					self.walk(rel, Some(&listing), None, out);
				} else {
					self.walk(rel, None, Some(&listing), out);
				}
			}
			Err(e) => {
				warn!("Cannot list {}: {}", root.join(rel).display(), e);
				if let Some(last) = out.iter_mut().rev().find(|r| Path::new(&r.relative_path) == rel) {
					last.error = Some(e.to_string());
				}
			}
		}
	}

	/// At least one side could not be stat'ed
	fn unreadable(
		&self,
		rel: &Path,
		l: Option<&io::Result<Entry>>,
		r: Option<&io::Result<Entry>>,
		out: &mut Vec<DiffRecord>,
	) {
		let left_ok = l.and_then(|res| res.as_ref().ok()).map(|e| (self.left_root, e));
		let right_ok = r.and_then(|res| res.as_ref().ok()).map(|e| (self.right_root, e));
		let error = l
			.and_then(|res| res.as_ref().err())
			.or_else(|| r.and_then(|res| res.as_ref().err()))
			.map(|e| e.to_string())
			.unwrap_or_default();

		let state = match (l.is_some(), r.is_some()) {
			(true, true) => DiffState::Differs,
			(true, false) => DiffState::LeftOnly,
			_ => DiffState::RightOnly,
		};
		warn!("Cannot read {}: {}", rel.display(), error);
		out.push(DiffRecord::new(rel, left_ok, right_ok, state).with_error(error));
	}
}

/// Read the entries of `root/rel`; per-entry stat failures are kept as errors
fn list_dir(root: &Path, rel: &Path) -> io::Result<Listing> {
	let mut listing = Listing::new();
	for dir_entry in fs::read_dir(root.join(rel))? {
		let dir_entry = dir_entry?;
		let name = dir_entry.file_name();
		let child: PathBuf = rel.join(&name);
		let entry = fs::metadata(dir_entry.path()).map(|meta| Entry::from_metadata(child, &meta));
		listing.insert(name, entry);
	}
	Ok(listing)
}

/// Full byte comparison of two files
pub fn contents_equal(a: &Path, b: &Path) -> io::Result<bool> {
	let mut fa = io::BufReader::new(fs::File::open(a)?);
	let mut fb = io::BufReader::new(fs::File::open(b)?);
	let mut buf_a = vec![0u8; COMPARE_BUF_SIZE];
	let mut buf_b = vec![0u8; COMPARE_BUF_SIZE];

	loop {
		let na = read_full(&mut fa, &mut buf_a)?;
		let nb = read_full(&mut fb, &mut buf_b)?;
		if na != nb || buf_a[..na] != buf_b[..nb] {
			return Ok(false);
		}
		if na == 0 {
			return Ok(true);
		}
	}
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
	let mut filled = 0;
	while filled < buf.len() {
		match reader.read(&mut buf[filled..]) {
			Ok(0) => break,
			Ok(n) => filled += n,
			Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => return Err(e),
		}
	}
	Ok(filled)
}


// vim: ts=4
