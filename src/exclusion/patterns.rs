//! Ignore rules: globs and regular expressions evaluated against relative paths

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use std::path::{Component, Path};

use crate::error::SyncError;
use crate::validation::to_slash;

/// Ignore rules used when no configuration overrides them
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &["node_modules", ".svn"];

/// One ignore rule as written in the configuration
#[derive(Debug, Clone)]
pub enum IgnoreRule {
	/// Glob, matched against the whole path and against every segment
	Glob(String),
	/// Regular expression written as `/expr/`, matched against the `/`-joined path
	Regex(Regex),
}

impl IgnoreRule {
	pub fn parse(pattern: &str) -> Result<Self, SyncError> {
		let trimmed = pattern.trim();
		if trimmed.is_empty() {
			return Err(SyncError::InvalidPattern {
				pattern: pattern.to_string(),
				message: "empty pattern".to_string(),
			});
		}
		if trimmed.len() > 2 && trimmed.starts_with('/') && trimmed.ends_with('/') {
			let expr = &trimmed[1..trimmed.len() - 1];
			let regex = Regex::new(expr).map_err(|e| SyncError::InvalidPattern {
				pattern: pattern.to_string(),
				message: e.to_string(),
			})?;
			return Ok(IgnoreRule::Regex(regex));
		}
		Ok(IgnoreRule::Glob(trimmed.to_string()))
	}
}

/// Ordered, immutable set of ignore rules
///
/// Built once at startup from the configuration and shared read-only.
#[derive(Debug, Clone)]
pub struct IgnoreRuleSet {
	rules: Vec<IgnoreRule>,
	globs: GlobSet,
	regexes: Vec<Regex>,
}

impl IgnoreRuleSet {
	pub fn new(patterns: &[String]) -> Result<Self, SyncError> {
		let mut rules = Vec::with_capacity(patterns.len());
		let mut builder = GlobSetBuilder::new();
		let mut regexes = Vec::new();

		for pattern in patterns {
			let rule = IgnoreRule::parse(pattern)?;
			match &rule {
				IgnoreRule::Glob(glob) => {
					let compiled = GlobBuilder::new(glob)
						.literal_separator(true)
						.build()
						.map_err(|e| SyncError::InvalidPattern {
							pattern: pattern.clone(),
							message: e.to_string(),
						})?;
					builder.add(compiled);
				}
				IgnoreRule::Regex(regex) => regexes.push(regex.clone()),
			}
			rules.push(rule);
		}

		let globs = builder.build().map_err(|e| SyncError::InvalidPattern {
			pattern: patterns.join(","),
			message: format!("Failed to build pattern set: {}", e),
		})?;

		Ok(Self { rules, globs, regexes })
	}

	pub fn is_empty(&self) -> bool {
		self.rules.is_empty()
	}

	pub fn rules(&self) -> &[IgnoreRule] {
		&self.rules
	}

	/// True if any rule matches the full path or a single segment of it
	pub fn matches(&self, relative_path: &Path) -> bool {
		if self.rules.is_empty() {
			return false;
		}

		let joined = to_slash(relative_path);
		if self.regexes.iter().any(|re| re.is_match(&joined)) {
			return true;
		}

		if self.globs.is_match(&joined) {
			return true;
		}

		relative_path.components().any(|c| match c {
			Component::Normal(segment) => self.globs.is_match(Path::new(segment)),
			_ => false,
		})
	}
}


// vim: ts=4
