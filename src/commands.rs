//! The top-level operations behind each CLI command
//!
//! Missing prerequisite directories are advisory: the command prints what to
//! run first and returns successfully.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::compare::{compare as compare_trees, CompareSummary};
use crate::config::{Config, SyncOptions};
use crate::error::SyncError;
use crate::exclusion::PathFilter;
use crate::fetch::ReleaseFetcher;
use crate::logging::*;
use crate::manifest::{check_manifest, ManifestStatus};
use crate::mirror::{copy_tree, CopyStats};
use crate::propagator::{PropagationStats, SyncPropagator};
use crate::report::{render_listing, DiffReportBuilder, ReportOutcome};
use crate::utils::shutdown_signal;
use crate::watcher::{ChangeWatcher, EventSource, NotifySource, WatchOptions};

/// Replace the mirror with a filtered copy of the source
///
/// Returns `None` when the source folder does not exist.
pub async fn copy(config: &Config) -> Result<Option<CopyStats>, SyncError> {
	let source = config.source_root()?;
	if !source.is_dir() {
		println!("Source folder '{}' doesn't seem to exist", source.display());
		return Ok(None);
	}

	let filter = config.path_filter()?;
	let mirror = config.mirror_dir.clone();
	let stats = tokio::task::spawn_blocking(move || copy_tree(&source, &mirror, &filter))
		.await
		.map_err(|e| SyncError::fatal(format!("Copy task failed: {}", e)))??;

	info!("Copied {} files in {} directories ({} skipped)", stats.files, stats.dirs, stats.skipped);
	Ok(Some(stats))
}

/// Copy, then keep the mirror in sync until SIGINT/SIGTERM
pub async fn sync(config: &Config) -> Result<Option<PropagationStats>, SyncError> {
	if copy(config).await?.is_none() {
		return Ok(None);
	}

	let source = config.source_root()?;
	info!("Starting sync between {} and {}", source.display(), config.mirror_dir.display());

	let stats = watch_and_propagate(
		source,
		config.mirror_dir.clone(),
		config.sync_options(),
		NotifySource::new(),
		async {
			let signal = shutdown_signal().await;
			info!("Stopping sync ({:?})", signal);
		},
	)
	.await?;

	Ok(Some(stats))
}

/// Run a watcher and a propagator over `source` until `shutdown` resolves or
/// the watcher fails
///
/// On shutdown the watcher flushes its pending events and the propagator
/// finishes them before this returns.
pub async fn watch_and_propagate<S, F>(
	source: PathBuf,
	mirror: PathBuf,
	options: SyncOptions,
	event_source: S,
	shutdown: F,
) -> Result<PropagationStats, SyncError>
where
	S: EventSource,
	F: Future<Output = ()>,
{
	let filter = Arc::new(PathFilter::new(&options.ignore_patterns)?);
	let (handle, events) = ChangeWatcher::spawn(
		source.clone(),
		Arc::clone(&filter),
		WatchOptions { debounce: options.debounce },
		event_source,
	)?;
	let propagator = SyncPropagator::new(options, source, mirror, filter);

	let propagation = propagator.run(events);
	tokio::pin!(propagation);
	tokio::pin!(shutdown);

	let result = tokio::select! {
		result = &mut propagation => {
			handle.stop().await;
			result
		}
		_ = &mut shutdown => {
			handle.stop().await;
			propagation.await
		}
	};

	let stats = result?;
	debug!("Sync finished: {:?}", stats);
	Ok(stats)
}

/// Print the Atlas UI version recorded in the mirror
pub fn check(config: &Config) -> Result<ManifestStatus, SyncError> {
	let status = check_manifest(&config.mirror_dir)?;
	match &status {
		ManifestStatus::Missing(path) => {
			println!("I can't find the manifest at {}. Please run the copy/sync command first", path.display())
		}
		ManifestStatus::Unversioned => println!(
			"Unknown version of Atlas UI, manifest.json in theme folder does not contain a version string"
		),
		ManifestStatus::Version(version) => println!("Theme is using Atlas UI version {}", version),
	}
	Ok(status)
}

/// Download the configured reference release
pub async fn atlasui(config: &Config) -> Result<Option<PathBuf>, SyncError> {
	let version = match config.atlas_ui_version.as_deref().map(str::trim) {
		Some(v) if !v.is_empty() => v.to_string(),
		_ => {
			println!(
				"Please define your AtlasUI version as THEME_ATLAS_UI_VERSION=\"x.x.x\". \
				 You can find this in the manifest.json file in your project root"
			);
			return Ok(None);
		}
	};

	let fetcher = ReleaseFetcher::new(config.release_base_url.clone())?;
	let dest = fetcher.fetch(&version, &config.reference_dir).await?;
	info!("Atlas UI {} extracted to {}", version, dest.display());
	Ok(Some(dest))
}

/// Compare the reference release with the mirror
///
/// With `list` the differences are printed, otherwise the content report is
/// written to the report directory.
pub async fn compare(config: &Config, list: bool) -> Result<Option<CompareSummary>, SyncError> {
	let reference = config.reference_dir.clone();
	let mirror = config.mirror_dir.clone();
	let have_mirror =
		advise_missing(&mirror, "You will first need to copy the source folder. Please run the 'copy' command");
	let have_reference = advise_missing(
		&reference,
		"You will first need to download the Atlas UI framework. Please run the 'atlasui' command",
	);
	if !(have_mirror && have_reference) {
		return Ok(None);
	}

	let options = config.compare_options()?;
	let records = tokio::task::spawn_blocking(move || compare_trees(&reference, &mirror, &options))
		.await
		.map_err(|e| SyncError::fatal(format!("Compare task failed: {}", e)))??;

	let summary = CompareSummary::from_records(&records);
	println!("I have found {} differences", summary.differences());

	if list {
		print!("{}", render_listing(&records));
		return Ok(Some(summary));
	}

	match DiffReportBuilder::new(config.report_path()).build_and_write(records).await? {
		ReportOutcome::NoDifferences => println!("We found no differences!"),
		ReportOutcome::Written { path, differences } => {
			println!("Written {} differences to: {}", differences, path.display())
		}
	}
	Ok(Some(summary))
}

/// True if `dir` exists; prints `hint` otherwise
fn advise_missing(dir: &Path, hint: &str) -> bool {
	if dir.is_dir() {
		return true;
	}
	println!("{} does not exist. {}", dir.display(), hint);
	false
}


// vim: ts=4
