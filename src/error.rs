//! Error types for themesync operations

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Main error type for sync, compare and report operations
#[derive(Debug)]
pub enum SyncError {
	/// A required directory or file does not exist
	PreconditionMissing { path: PathBuf, hint: String },

	/// Read/write/remove failure on a single entry
	Io { path: PathBuf, source: io::Error },

	/// Watch source died or a strict-mode failure escalated
	Fatal { message: String },

	/// The diff report could not be persisted
	ReportWrite { path: PathBuf, source: Box<dyn Error + Send + Sync> },

	/// Invalid configuration
	InvalidConfig { message: String },

	/// An ignore or exclude pattern failed to compile
	InvalidPattern { pattern: String, message: String },

	/// Release download or extraction failed
	Fetch { message: String },

	/// Path validation error (nested)
	Validation(crate::validation::ValidationError),
}

impl SyncError {
	/// Wrap an I/O error with the path it happened on
	pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		SyncError::Io { path: path.into(), source }
	}

	pub fn fatal(message: impl Into<String>) -> Self {
		SyncError::Fatal { message: message.into() }
	}

	pub fn missing(path: impl Into<PathBuf>, hint: impl Into<String>) -> Self {
		SyncError::PreconditionMissing { path: path.into(), hint: hint.into() }
	}
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::PreconditionMissing { path, hint } => {
				write!(f, "{} does not exist. {}", path.display(), hint)
			}
			SyncError::Io { path, source } => {
				write!(f, "I/O error on {}: {}", path.display(), source)
			}
			SyncError::Fatal { message } => write!(f, "Fatal: {}", message),
			SyncError::ReportWrite { path, source } => {
				write!(f, "Failed to write report {}: {}", path.display(), source)
			}
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::InvalidPattern { pattern, message } => {
				write!(f, "Invalid pattern '{}': {}", pattern, message)
			}
			SyncError::Fetch { message } => write!(f, "Release fetch failed: {}", message),
			SyncError::Validation(e) => write!(f, "Validation error: {}", e),
		}
	}
}

impl Error for SyncError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SyncError::Io { source, .. } => Some(source),
			SyncError::ReportWrite { source, .. } => Some(source.as_ref()),
			SyncError::Validation(e) => Some(e),
			_ => None,
		}
	}
}

impl From<crate::validation::ValidationError> for SyncError {
	fn from(e: crate::validation::ValidationError) -> Self {
		SyncError::Validation(e)
	}
}

impl From<reqwest::Error> for SyncError {
	fn from(e: reqwest::Error) -> Self {
		SyncError::Fetch { message: e.to_string() }
	}
}


// vim: ts=4
