//! Path validation functions

use std::path::{Component, Path, PathBuf};

use super::ValidationError;

/// Check if a path is safe (no parent directory references)
///
/// Paths coming from the watcher are joined onto the mirror root, so a `..`
/// component could escape it.
pub fn is_path_safe(path: &Path) -> bool {
	!path.components().any(|c| matches!(c, Component::ParentDir))
}

/// Validate a relative path before it is joined onto a tree root
pub fn validate_relative_path(path: &Path) -> Result<(), ValidationError> {
	if path.is_absolute() {
		return Err(ValidationError::PathError(format!(
			"Path must be relative, got absolute path: {:?}",
			path
		)));
	}
	if !is_path_safe(path) {
		return Err(ValidationError::PathError(
			"Path contains parent directory reference (..)".to_string(),
		));
	}
	if path.as_os_str().is_empty() {
		return Err(ValidationError::PathError("Path is empty".to_string()));
	}
	Ok(())
}

/// Strip `root` from an absolute path, keeping only normal components
///
/// Returns `None` for the root itself and for paths outside of it.
pub fn relative_to_root(path: &Path, root: &Path) -> Option<PathBuf> {
	let rel = path.strip_prefix(root).ok()?;
	let normalized: PathBuf = rel
		.components()
		.filter(|c| matches!(c, Component::Normal(_)))
		.collect();
	if normalized.as_os_str().is_empty() {
		None
	} else {
		Some(normalized)
	}
}

/// Render a relative path with `/` separators on every platform
pub fn to_slash(path: &Path) -> String {
	path.components()
		.filter_map(|c| match c {
			Component::Normal(s) => Some(s.to_string_lossy()),
			_ => None,
		})
		.collect::<Vec<_>>()
		.join("/")
}
