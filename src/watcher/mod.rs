//! Source-tree watcher
//!
//! Turns raw platform notifications into an ordered stream of
//! [`ChangeEvent`]s: paths are made relative to the watched root, ignored
//! paths are dropped, kinds are normalized and bursts are coalesced. A
//! failing source ends the stream with a single `Err` item.

mod debounce;
mod source;

pub use debounce::Coalescer;
pub use source::{map_event, ChannelSource, EventSource, NotifySource, RawEvent, RawKind, RawSender};

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::SyncError;
use crate::exclusion::PathFilter;
use crate::logging::*;
use crate::types::{ChangeEvent, ChangeKind};
use crate::validation::relative_to_root;

/// Capacity of the normalized event channel
const EVENT_CHANNEL_SIZE: usize = 1024;

/// One item of the watch stream
pub type WatchItem = Result<ChangeEvent, SyncError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
	pub debounce: Duration,
}

impl Default for WatchOptions {
	fn default() -> Self {
		WatchOptions { debounce: Duration::from_millis(50) }
	}
}

/// Stops a running watcher
pub struct WatchHandle {
	stop_tx: Option<oneshot::Sender<()>>,
	task: JoinHandle<()>,
}

impl WatchHandle {
	/// Flush pending events, release the source and wait for the task to end
	pub async fn stop(mut self) {
		if let Some(tx) = self.stop_tx.take() {
			let _ = tx.send(());
		}
		if let Err(e) = (&mut self.task).await {
			warn!("Watcher task ended abnormally: {}", e);
		}
	}
}

pub struct ChangeWatcher;

impl ChangeWatcher {
	/// Start watching `root` and return the event stream
	///
	/// The stream ends after [`WatchHandle::stop`], after a fatal `Err` item,
	/// or when the receiver is dropped.
	pub fn spawn<S: EventSource>(
		root: PathBuf,
		filter: Arc<PathFilter>,
		options: WatchOptions,
		mut source: S,
	) -> Result<(WatchHandle, mpsc::Receiver<WatchItem>), SyncError> {
		if !root.is_dir() {
			return Err(SyncError::missing(&root, "Nothing to watch."));
		}
		// backends report absolute, possibly resolved, paths
		let given = if root.is_absolute() {
			root
		} else {
			std::env::current_dir().map_err(|e| SyncError::io(&root, e))?.join(&root)
		};
		let root = fs::canonicalize(&given).map_err(|e| SyncError::io(&given, e))?;
		let alias = (given != root).then_some(given);

		let known_dirs = scan_dirs(&root, &filter);
		let (raw_tx, raw_rx) = mpsc::unbounded_channel();
		source.start(&root, raw_tx)?;

		let (out_tx, out_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
		let (stop_tx, stop_rx) = oneshot::channel();

		let state = WatchState { root, alias, filter, known_dirs, coalescer: Coalescer::new(options.debounce) };
		let task = tokio::spawn(state.run(source, raw_rx, out_tx, stop_rx));

		Ok((WatchHandle { stop_tx: Some(stop_tx), task }, out_rx))
	}
}

struct WatchState {
	root: PathBuf,
	/// The root as it was given, when that differs from the resolved one
	alias: Option<PathBuf>,
	filter: Arc<PathFilter>,
	/// Relative directories known to exist, for classifying removals
	known_dirs: HashSet<PathBuf>,
	coalescer: Coalescer,
}

impl WatchState {
	async fn run<S: EventSource>(
		mut self,
		mut source: S,
		mut raw_rx: mpsc::UnboundedReceiver<Result<RawEvent, SyncError>>,
		out_tx: mpsc::Sender<WatchItem>,
		mut stop_rx: oneshot::Receiver<()>,
	) {
		debug!("Watching {}", self.root.display());

		loop {
			let flush_at = self.coalescer.next_flush();

			tokio::select! {
				biased;

				// an explicit stop, or the handle was dropped
				_ = &mut stop_rx => {
					let _ = emit(&out_tx, self.coalescer.drain_all()).await;
					break;
				}

				raw = raw_rx.recv() => match raw {
					Some(Ok(raw)) => {
						let now = Instant::now();
						for event in self.normalize(raw) {
							self.coalescer.push(event, now);
						}
					}
					Some(Err(e)) => {
						error!("Watch source failed: {}", e);
						let _ = emit(&out_tx, self.coalescer.drain_all()).await;
						let _ = out_tx.send(Err(e)).await;
						break;
					}
					None => {
						let _ = emit(&out_tx, self.coalescer.drain_all()).await;
						let _ = out_tx.send(Err(SyncError::fatal("Watch source closed unexpectedly"))).await;
						break;
					}
				},

				_ = tokio::time::sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
					let ready = self.coalescer.drain_ready(Instant::now());
					if !emit(&out_tx, ready).await {
						break;
					}
				}
			}
		}

		source.stop();
		debug!("Stopped watching {}", self.root.display());
	}

	/// Map a raw notification to zero or more normalized events
	fn normalize(&mut self, raw: RawEvent) -> Vec<ChangeEvent> {
		let rel = relative_to_root(&raw.path, &self.root)
			.or_else(|| self.alias.as_deref().and_then(|alias| relative_to_root(&raw.path, alias)));
		let rel = match rel {
			Some(rel) => rel,
			None => {
				if raw.path == self.root && !self.root.is_dir() {
					warn!("Watched directory {} is gone", self.root.display());
				}
				return Vec::new();
			}
		};
		if self.filter.is_ignored(&rel) {
			return Vec::new();
		}

		let kind = match raw.kind {
			RawKind::Create { is_dir } => {
				let is_dir = is_dir.unwrap_or_else(|| raw.path.is_dir());
				if is_dir {
					self.known_dirs.insert(rel.clone());
				}
				ChangeKind::Created
			}
			RawKind::RenameTo => {
				if raw.path.is_dir() {
					self.known_dirs.insert(rel.clone());
				}
				ChangeKind::Created
			}
			RawKind::Remove { is_dir } => self.removal(&rel, is_dir),
			RawKind::RenameFrom => self.removal(&rel, None),
			RawKind::Modify | RawKind::Any => match fs::symlink_metadata(&raw.path) {
				// a directory's own modification carries no content
				Ok(meta) if meta.is_dir() => {
					if self.known_dirs.insert(rel.clone()) {
						ChangeKind::Created
					} else {
						return Vec::new();
					}
				}
				Ok(_) => ChangeKind::Modified,
				Err(_) => self.removal(&rel, None),
			},
		};

		vec![ChangeEvent::new(kind, rel)]
	}

	fn removal(&mut self, rel: &Path, is_dir: Option<bool>) -> ChangeKind {
		let was_dir = is_dir.unwrap_or_else(|| self.known_dirs.contains(rel));
		if was_dir {
			self.known_dirs.retain(|d| !d.starts_with(rel));
			ChangeKind::DeletedDirectory
		} else {
			ChangeKind::DeletedFile
		}
	}
}

/// Send a batch downstream; false once the receiver is gone
async fn emit(out_tx: &mpsc::Sender<WatchItem>, events: Vec<ChangeEvent>) -> bool {
	for event in events {
		debug!("{:?} {}", event.kind, event.relative_path.display());
		if out_tx.send(Ok(event)).await.is_err() {
			return false;
		}
	}
	true
}

/// Directories under `root` that pass the filter, relative to `root`
fn scan_dirs(root: &Path, filter: &PathFilter) -> HashSet<PathBuf> {
	let mut dirs = HashSet::new();
	let mut stack = vec![PathBuf::new()];

	while let Some(rel) = stack.pop() {
		let entries = match fs::read_dir(root.join(&rel)) {
			Ok(entries) => entries,
			Err(e) => {
				debug!("Cannot scan {}: {}", root.join(&rel).display(), e);
				continue;
			}
		};
		for entry in entries.flatten() {
			let child = rel.join(entry.file_name());
			let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
			if is_dir && !filter.is_ignored(&child) {
				dirs.insert(child.clone());
				stack.push(child);
			}
		}
	}
	dirs
}


// vim: ts=4
