//! Path filtering for sync and diff
//!
//! Two independent filters live here:
//! - [`PathFilter`]: the ignore rule set applied to watched and mirrored paths
//! - [`NameFilter`]: the comparator's exclude filter, matched on entry names

mod names;
mod patterns;

pub use names::{NameFilter, DEFAULT_EXCLUDE_FILTER};
pub use patterns::{IgnoreRule, IgnoreRuleSet, DEFAULT_IGNORE_PATTERNS};

use std::path::Path;

use crate::error::SyncError;

/// Suffix of the temp files written next to their final mirror location
pub const TEMP_SUFFIX: &str = ".themesync-tmp";

/// Decides whether a relative path takes part in sync
///
/// Evaluated twice on purpose: by the watcher before an event is emitted and
/// by the propagator before the mirror is written, since raw notifications can
/// arrive for ignored paths.
#[derive(Debug, Clone)]
pub struct PathFilter {
	rules: IgnoreRuleSet,
	always_ignore: IgnoreRuleSet,
}

impl PathFilter {
	pub fn new(patterns: &[String]) -> Result<Self, SyncError> {
		Ok(Self { rules: IgnoreRuleSet::new(patterns)?, always_ignore: Self::build_always_ignored()? })
	}

	/// Only our own in-flight writes; everything else is up to the configuration
	fn build_always_ignored() -> Result<IgnoreRuleSet, SyncError> {
		IgnoreRuleSet::new(&[format!("*{}", TEMP_SUFFIX)])
	}

	/// True if any rule matches the full relative path or one of its segments
	pub fn is_ignored(&self, relative_path: &Path) -> bool {
		self.always_ignore.matches(relative_path) || self.rules.matches(relative_path)
	}
}


// vim: ts=4
