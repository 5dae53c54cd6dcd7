//! Configuration for themesync
//!
//! All settings live in one `Config` struct that is passed explicitly to each
//! component. The priority chain is:
//! 1. Built-in defaults (`Config::default()`)
//! 2. Config file (`themesync.toml` or `themesync.json` in the working directory,
//!    or the file given with `--config`)
//! 3. Environment variables (`THEME_PATH`, `THEME_ATLAS_UI_VERSION`, `THEMESYNC_*`)
//! 4. CLI flags (highest priority, applied by the caller)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::compare::CompareOptions;
use crate::error::SyncError;
use crate::exclusion::{NameFilter, PathFilter, DEFAULT_EXCLUDE_FILTER, DEFAULT_IGNORE_PATTERNS};
use crate::validation;

/// Config file names looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILES: &[&str] = &["themesync.toml", "themesync.json"];

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// TREES
	// ========================================================================
	/// Project directory that contains the theme folder (`THEME_PATH`)
	pub theme_path: Option<PathBuf>,

	/// Name of the theme folder inside `theme_path`
	pub theme_folder: String,

	/// Local working copy kept in sync with the source
	pub mirror_dir: PathBuf,

	/// Where the reference release is extracted
	pub reference_dir: PathBuf,

	/// Directory that receives `diff.json`
	pub report_dir: PathBuf,

	// ========================================================================
	// SYNC
	// ========================================================================
	/// Ignore rules; `/expr/` is a regular expression, anything else a glob
	pub ignore_patterns: Vec<String>,

	/// Stop the propagator on the first failed apply
	pub strict: bool,

	/// Quiet period before a path's notifications are emitted as one event
	pub debounce_ms: u64,

	/// Concurrent apply operations for distinct paths
	pub parallel_transfers: usize,

	// ========================================================================
	// COMPARE
	// ========================================================================
	/// Comma-separated name globs skipped by the comparator
	pub exclude_filter: String,

	/// Compare file contents byte by byte when sizes match
	pub compare_content: bool,

	/// Files of different size are different
	pub compare_size: bool,

	// ========================================================================
	// RELEASE FETCH
	// ========================================================================
	/// Atlas UI release to download (`THEME_ATLAS_UI_VERSION`)
	pub atlas_ui_version: Option<String>,

	/// Base URL of the release archives; `{version}.tar.gz` is appended
	pub release_base_url: String,

	// ========================================================================
	// OUTPUT & LOGGING
	// ========================================================================
	/// Default log level when `RUST_LOG` is not set
	pub log_level: String,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			theme_path: None,
			theme_folder: "theme".to_string(),
			mirror_dir: PathBuf::from("theme"),
			reference_dir: PathBuf::from("atlasui"),
			report_dir: PathBuf::from("diff"),

			ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect(),
			strict: true,
			debounce_ms: 50,
			parallel_transfers: 4,

			exclude_filter: DEFAULT_EXCLUDE_FILTER.to_string(),
			compare_content: true,
			compare_size: true,

			atlas_ui_version: None,
			release_base_url: "https://github.com/mendix/Atlas-UI-Framework/archive".to_string(),

			log_level: "info".to_string(),
		}
	}
}

impl Config {
	/// Load defaults, then the config file, then the process environment
	pub fn load(config_file: Option<&Path>) -> Result<Self, SyncError> {
		let mut config = match config_file {
			Some(path) => Self::from_file(path)?,
			None => match DEFAULT_CONFIG_FILES.iter().map(Path::new).find(|p| p.is_file()) {
				Some(path) => Self::from_file(path)?,
				None => Config::default(),
			},
		};
		config.apply_env_from(|key| std::env::var(key).ok());
		config.validate()?;
		Ok(config)
	}

	/// Parse a `.toml`, `.json` or `.json5` config file
	pub fn from_file(path: &Path) -> Result<Self, SyncError> {
		let contents = std::fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
		let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
		match ext.as_str() {
			"toml" => toml::from_str(&contents).map_err(|e| SyncError::InvalidConfig {
				message: format!("{}: {}", path.display(), e),
			}),
			"json" | "json5" => json5::from_str(&contents).map_err(|e| SyncError::InvalidConfig {
				message: format!("{}: {}", path.display(), e),
			}),
			_ => Err(SyncError::InvalidConfig {
				message: format!("Unsupported config file type: {}", path.display()),
			}),
		}
	}

	/// Overlay environment variables read through `lookup`
	pub fn apply_env_from<F>(&mut self, lookup: F)
	where
		F: Fn(&str) -> Option<String>,
	{
		let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

		if let Some(path) = non_empty("THEME_PATH") {
			self.theme_path = Some(PathBuf::from(path));
		}
		if let Some(version) = non_empty("THEME_ATLAS_UI_VERSION") {
			self.atlas_ui_version = Some(version);
		}
		if let Some(level) = non_empty("THEMESYNC_LOG") {
			self.log_level = level;
		}
		if let Some(strict) = non_empty("THEMESYNC_STRICT") {
			self.strict = matches!(strict.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
		}
	}

	pub fn validate(&self) -> Result<(), SyncError> {
		validation::validate_debounce_ms(self.debounce_ms)?;
		validation::validate_parallel_transfers(self.parallel_transfers)?;
		if self.theme_folder.trim().is_empty() {
			return Err(SyncError::InvalidConfig { message: "themeFolder is empty".to_string() });
		}
		Ok(())
	}

	/// The theme folder inside the source project
	pub fn source_root(&self) -> Result<PathBuf, SyncError> {
		match &self.theme_path {
			Some(path) => Ok(path.join(&self.theme_folder)),
			None => Err(SyncError::InvalidConfig {
				message: "Please define the project directory in THEME_PATH".to_string(),
			}),
		}
	}

	pub fn path_filter(&self) -> Result<PathFilter, SyncError> {
		PathFilter::new(&self.ignore_patterns)
	}

	pub fn sync_options(&self) -> SyncOptions {
		SyncOptions {
			strict: self.strict,
			ignore_patterns: self.ignore_patterns.clone(),
			debounce: Duration::from_millis(self.debounce_ms),
			parallel_transfers: self.parallel_transfers,
		}
	}

	pub fn compare_options(&self) -> Result<CompareOptions, SyncError> {
		Ok(CompareOptions {
			compare_size: self.compare_size,
			compare_content: self.compare_content,
			exclude_filter: NameFilter::parse(&self.exclude_filter)?,
		})
	}

	pub fn report_path(&self) -> PathBuf {
		self.report_dir.join("diff.json")
	}
}

// ============================================================================
// SUBSYSTEM OPTIONS
// ============================================================================

/// Settings of the watcher and propagator
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
	pub strict: bool,
	pub ignore_patterns: Vec<String>,
	pub debounce: Duration,
	pub parallel_transfers: usize,
}

impl Default for SyncOptions {
	fn default() -> Self {
		Config::default().sync_options()
	}
}


// vim: ts=4
