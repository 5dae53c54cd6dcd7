//! Applies watcher events to the mirror tree
//!
//! The dispatcher keeps a table of lanes keyed by path. Each lane is a serial
//! queue: its events run one after another in arrival order, while different
//! lanes run concurrently up to `parallel_transfers`. An event joins the
//! outermost lane among its path and its ancestors, and a new lane waits
//! until every lane below it has drained, so a directory operation never
//! overlaps work inside that directory.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::config::SyncOptions;
use crate::error::SyncError;
use crate::exclusion::PathFilter;
use crate::logging::*;
use crate::mirror::{self, ApplyOutcome};
use crate::types::{ChangeEvent, ChangeKind};
use crate::validation::to_slash;
use crate::watcher::WatchItem;

/// Counters of one propagation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationStats {
	pub events: usize,
	pub copied: usize,
	pub unchanged: usize,
	pub removed: usize,
	pub ignored: usize,
	pub failed: usize,
	/// Paths whose last apply failed and that saw no later success
	pub unresolved: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct Lane {
	pending: VecDeque<ChangeEvent>,
	busy: bool,
}

struct ApplyContext {
	source_root: PathBuf,
	mirror_root: PathBuf,
	filter: Arc<PathFilter>,
	permits: Semaphore,
}

type Finished = (PathBuf, ChangeEvent, Result<ApplyOutcome, SyncError>);

pub struct SyncPropagator {
	options: SyncOptions,
	ctx: Arc<ApplyContext>,
}

impl SyncPropagator {
	pub fn new(options: SyncOptions, source_root: PathBuf, mirror_root: PathBuf, filter: Arc<PathFilter>) -> Self {
		let permits = Semaphore::new(options.parallel_transfers.max(1));
		SyncPropagator { options, ctx: Arc::new(ApplyContext { source_root, mirror_root, filter, permits }) }
	}

	/// Consume `events` until the stream closes
	///
	/// A fatal stream item, or any failed apply in strict mode, stops dispatch;
	/// work already running is awaited before the error is returned.
	pub async fn run(&self, mut events: mpsc::Receiver<WatchItem>) -> Result<PropagationStats, SyncError> {
		let mut run = Run::new();
		let mut open = true;

		loop {
			if (!open || run.stop.is_some()) && run.tasks.is_empty() {
				break;
			}

			tokio::select! {
				item = events.recv(), if open && run.stop.is_none() => match item {
					Some(Ok(event)) => self.dispatch(&mut run, event),
					Some(Err(e)) => {
						error!("Stopping sync: {}", e);
						run.stop = Some(e);
					}
					None => open = false,
				},

				Some(joined) = run.tasks.join_next(), if !run.tasks.is_empty() => match joined {
					Ok((key, event, result)) => self.finish(&mut run, key, event, result),
					Err(e) => {
						run.stop.get_or_insert_with(|| SyncError::fatal(format!("Apply task failed: {}", e)));
					}
				},
			}
		}

		let mut stats = run.stats;
		stats.unresolved = run.failed.into_iter().collect();
		stats.unresolved.sort();

		match run.stop {
			Some(e) => Err(e),
			None => Ok(stats),
		}
	}

	fn dispatch(&self, run: &mut Run, event: ChangeEvent) {
		run.stats.events += 1;
		if self.ctx.filter.is_ignored(&event.relative_path) {
			debug!("Ignored - {}", to_slash(&event.relative_path));
			run.stats.ignored += 1;
			return;
		}

		let key = event
			.relative_path
			.ancestors()
			.filter(|a| run.lanes.contains_key(*a))
			.last()
			.map(Path::to_path_buf)
			.unwrap_or_else(|| event.relative_path.clone());

		run.lanes.entry(key.clone()).or_default().pending.push_back(event);
		self.try_start(run, &key);
	}

	fn try_start(&self, run: &mut Run, key: &Path) {
		if run.stop.is_some() {
			return;
		}
		let blocked = run.lanes.keys().any(|k| k.as_path() != key && k.starts_with(key));
		let lane = match run.lanes.get_mut(key) {
			Some(lane) if !lane.busy && !blocked => lane,
			_ => return,
		};
		let event = match lane.pending.pop_front() {
			Some(event) => event,
			None => {
				run.lanes.remove(key);
				return;
			}
		};
		lane.busy = true;

		let ctx = Arc::clone(&self.ctx);
		let key = key.to_path_buf();
		run.tasks.spawn(async move {
			let result = apply(&ctx, &event).await;
			(key, event, result)
		});
	}

	fn finish(&self, run: &mut Run, key: PathBuf, event: ChangeEvent, result: Result<ApplyOutcome, SyncError>) {
		let rel = to_slash(&event.relative_path);
		match result {
			Ok(outcome) => {
				if run.failed.remove(&event.relative_path) {
					info!("Recovered - {}", rel);
				}
				self.record(&mut run.stats, &event, outcome, &rel);
			}
			Err(e) => {
				run.stats.failed += 1;
				run.failed.insert(event.relative_path.clone());
				if self.options.strict {
					error!("{} - {} failed: {}", event.kind.label(), rel, e);
					run.stop.get_or_insert_with(|| {
						SyncError::fatal(format!("{} {} failed: {}", event.kind.label(), rel, e))
					});
				} else {
					warn!("{} - {} failed, will retry on next change: {}", event.kind.label(), rel, e);
				}
			}
		}

		if let Some(lane) = run.lanes.get_mut(&key) {
			lane.busy = false;
			if lane.pending.is_empty() {
				run.lanes.remove(&key);
			}
		}
		self.try_start(run, &key);

		// lanes above this one may have been waiting for it
		for ancestor in key.ancestors().skip(1) {
			if run.lanes.contains_key(ancestor) {
				self.try_start(run, ancestor);
			}
		}
	}

	fn record(&self, stats: &mut PropagationStats, event: &ChangeEvent, outcome: ApplyOutcome, rel: &str) {
		match outcome {
			ApplyOutcome::Copied => {
				stats.copied += 1;
				info!("{} - {}", event.kind.label(), rel);
			}
			ApplyOutcome::CopiedDir { files } => {
				stats.copied += 1;
				info!("{} - {} ({} files)", event.kind.label(), rel, files);
			}
			ApplyOutcome::Removed => {
				stats.removed += 1;
				let label = if event.kind.is_removal() { event.kind.label() } else { ChangeKind::DeletedFile.label() };
				info!("{} - {}", label, rel);
			}
			ApplyOutcome::Unchanged => {
				stats.unchanged += 1;
				debug!("Unchanged - {}", rel);
			}
			ApplyOutcome::Absent => {
				stats.unchanged += 1;
				debug!("Already absent - {}", rel);
			}
			ApplyOutcome::Ignored => {
				stats.ignored += 1;
				debug!("Ignored - {}", rel);
			}
		}
	}
}

struct Run {
	lanes: BTreeMap<PathBuf, Lane>,
	tasks: JoinSet<Finished>,
	failed: HashSet<PathBuf>,
	stats: PropagationStats,
	stop: Option<SyncError>,
}

impl Run {
	fn new() -> Self {
		Run {
			lanes: BTreeMap::new(),
			tasks: JoinSet::new(),
			failed: HashSet::new(),
			stats: PropagationStats::default(),
			stop: None,
		}
	}
}

async fn apply(ctx: &ApplyContext, event: &ChangeEvent) -> Result<ApplyOutcome, SyncError> {
	let _permit = ctx.permits.acquire().await.map_err(|_| SyncError::fatal("Transfer limiter closed"))?;
	match event.kind {
		ChangeKind::Created | ChangeKind::Modified => {
			mirror::copy_entry(&ctx.source_root, &ctx.mirror_root, &event.relative_path, &ctx.filter).await
		}
		ChangeKind::DeletedFile | ChangeKind::DeletedDirectory => {
			mirror::remove_entry(&ctx.mirror_root, &event.relative_path).await
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use std::time::Duration;
	use tempfile::TempDir;

	struct Trees {
		_tmp: TempDir,
		src: PathBuf,
		mirror: PathBuf,
	}

	fn trees() -> Trees {
		let tmp = TempDir::new().unwrap();
		let src = tmp.path().join("src");
		let mirror = tmp.path().join("mirror");
		fs::create_dir_all(&src).unwrap();
		fs::create_dir_all(&mirror).unwrap();
		Trees { _tmp: tmp, src, mirror }
	}

	fn propagator(t: &Trees, strict: bool) -> SyncPropagator {
		let options = SyncOptions {
			strict,
			ignore_patterns: vec!["node_modules".to_string()],
			debounce: Duration::from_millis(10),
			parallel_transfers: 4,
		};
		let filter = Arc::new(PathFilter::new(&options.ignore_patterns).unwrap());
		SyncPropagator::new(options, t.src.clone(), t.mirror.clone(), filter)
	}

	async fn feed(items: Vec<WatchItem>) -> mpsc::Receiver<WatchItem> {
		let (tx, rx) = mpsc::channel(items.len().max(1));
		for item in items {
			tx.send(item).await.unwrap();
		}
		rx
	}

	#[tokio::test]
	async fn test_copy_then_delete_in_order() {
		let t = trees();
		fs::write(t.src.join("a.txt"), "hi").unwrap();

		let stats = propagator(&t, true)
			.run(feed(vec![Ok(ChangeEvent::new(ChangeKind::Created, "a.txt"))]).await)
			.await
			.unwrap();
		assert_eq!(stats.copied, 1);
		assert_eq!(fs::read_to_string(t.mirror.join("a.txt")).unwrap(), "hi");

		fs::remove_file(t.src.join("a.txt")).unwrap();
		let stats = propagator(&t, true)
			.run(feed(vec![Ok(ChangeEvent::new(ChangeKind::DeletedFile, "a.txt"))]).await)
			.await
			.unwrap();
		assert_eq!(stats.removed, 1);
		assert!(!t.mirror.join("a.txt").exists());
	}

	#[tokio::test]
	async fn test_same_path_events_apply_in_order() {
		let t = trees();
		fs::write(t.src.join("a.txt"), "v2").unwrap();

		// copy, remove, copy: the last one wins
		let events = vec![
			Ok(ChangeEvent::new(ChangeKind::Modified, "a.txt")),
			Ok(ChangeEvent::new(ChangeKind::DeletedFile, "a.txt")),
			Ok(ChangeEvent::new(ChangeKind::Modified, "a.txt")),
		];
		let stats = propagator(&t, true).run(feed(events).await).await.unwrap();

		assert_eq!(stats.events, 3);
		assert_eq!(fs::read_to_string(t.mirror.join("a.txt")).unwrap(), "v2");
	}

	#[tokio::test]
	async fn test_directory_removal_waits_for_children() {
		let t = trees();
		fs::create_dir_all(t.mirror.join("sub/deep")).unwrap();
		fs::write(t.mirror.join("sub/deep/c.txt"), "x").unwrap();
		fs::write(t.mirror.join("sub/b.txt"), "x").unwrap();
		fs::create_dir_all(t.src.join("sub")).unwrap();
		fs::write(t.src.join("sub/b.txt"), "new").unwrap();

		let events = vec![
			Ok(ChangeEvent::new(ChangeKind::Modified, "sub/b.txt")),
			Ok(ChangeEvent::new(ChangeKind::DeletedDirectory, "sub")),
		];
		fs::remove_dir_all(t.src.join("sub")).unwrap();
		propagator(&t, true).run(feed(events).await).await.unwrap();

		assert!(!t.mirror.join("sub").exists());
	}

	#[tokio::test]
	async fn test_ignored_events_never_touch_mirror() {
		let t = trees();
		fs::create_dir_all(t.src.join("node_modules")).unwrap();
		fs::write(t.src.join("node_modules/x.js"), "js").unwrap();

		let stats = propagator(&t, true)
			.run(feed(vec![Ok(ChangeEvent::new(ChangeKind::Created, "node_modules/x.js"))]).await)
			.await
			.unwrap();

		assert_eq!(stats.ignored, 1);
		assert!(!t.mirror.join("node_modules").exists());
	}

	#[tokio::test]
	async fn test_lenient_mode_records_failure_and_continues() {
		let t = trees();
		fs::write(t.src.join("ok.txt"), "fine").unwrap();

		let events = vec![
			Ok(ChangeEvent::new(ChangeKind::Modified, "../escape.txt")),
			Ok(ChangeEvent::new(ChangeKind::Modified, "ok.txt")),
		];
		let stats = propagator(&t, false).run(feed(events).await).await.unwrap();

		assert_eq!(stats.failed, 1);
		assert_eq!(stats.unresolved, vec![PathBuf::from("../escape.txt")]);
		assert_eq!(fs::read_to_string(t.mirror.join("ok.txt")).unwrap(), "fine");
	}

	#[tokio::test]
	async fn test_strict_mode_stops_on_failure() {
		let t = trees();
		let result = propagator(&t, true)
			.run(feed(vec![Ok(ChangeEvent::new(ChangeKind::Modified, "../escape.txt"))]).await)
			.await;

		assert!(matches!(result, Err(SyncError::Fatal { .. })));
	}

	#[tokio::test]
	async fn test_fatal_stream_item_stops() {
		let t = trees();
		let result = propagator(&t, false).run(feed(vec![Err(SyncError::fatal("watch died"))]).await).await;

		match result {
			Err(SyncError::Fatal { message }) => assert_eq!(message, "watch died"),
			other => panic!("unexpected: {:?}", other),
		}
	}
}

// vim: ts=4
