//! Name-based exclude filter used by the tree comparator

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

use crate::error::SyncError;

/// Hidden entries (VCS metadata included), source maps and font files
pub const DEFAULT_EXCLUDE_FILTER: &str = ".*,*.map,*.ttf,*.tff,*.woff,*.woff2,*.eot";

/// Comma-separated name globs; an entry whose file name matches is skipped
#[derive(Debug, Clone)]
pub struct NameFilter {
	patterns: Vec<String>,
	set: GlobSet,
}

impl NameFilter {
	/// Parse a filter like `".*,*.map,*.woff"`
	pub fn parse(filter: &str) -> Result<Self, SyncError> {
		let patterns: Vec<String> = filter
			.split(',')
			.map(str::trim)
			.filter(|p| !p.is_empty())
			.map(String::from)
			.collect();

		let mut builder = GlobSetBuilder::new();
		for pattern in &patterns {
			let glob = Glob::new(pattern).map_err(|e| SyncError::InvalidPattern {
				pattern: pattern.clone(),
				message: e.to_string(),
			})?;
			builder.add(glob);
		}
		let set = builder.build().map_err(|e| SyncError::InvalidPattern {
			pattern: filter.to_string(),
			message: e.to_string(),
		})?;

		Ok(Self { patterns, set })
	}

	/// Filter that excludes nothing
	pub fn none() -> Self {
		Self { patterns: Vec::new(), set: GlobSet::empty() }
	}

	pub fn patterns(&self) -> &[String] {
		&self.patterns
	}

	/// Match the last component of `path` against the filter
	pub fn is_excluded(&self, path: &Path) -> bool {
		match path.file_name() {
			Some(name) => self.set.is_match(Path::new(name)),
			None => false,
		}
	}
}

impl Default for NameFilter {
	fn default() -> Self {
		Self::none()
	}
}


// vim: ts=4
