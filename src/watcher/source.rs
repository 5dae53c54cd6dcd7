//! Raw notification sources feeding the watcher

use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::logging::*;

/// What the platform reported, before normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
	/// `is_dir` is `None` when the backend does not say
	Create { is_dir: Option<bool> },
	Modify,
	Remove { is_dir: Option<bool> },
	RenameFrom,
	RenameTo,
	/// Something happened; the current state of the path decides what
	Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
	pub kind: RawKind,
	/// Absolute path
	pub path: PathBuf,
}

impl RawEvent {
	pub fn new(kind: RawKind, path: impl Into<PathBuf>) -> Self {
		RawEvent { kind, path: path.into() }
	}
}

pub type RawSender = mpsc::UnboundedSender<Result<RawEvent, SyncError>>;

/// A producer of raw notifications for a directory tree
///
/// An `Err` item is an unrecoverable failure of the source; the watcher ends
/// its stream after forwarding it.
pub trait EventSource: Send + 'static {
	fn start(&mut self, root: &Path, tx: RawSender) -> Result<(), SyncError>;

	fn stop(&mut self);
}

/// Platform notifications through the `notify` crate
#[derive(Default)]
pub struct NotifySource {
	watcher: Option<RecommendedWatcher>,
}

impl NotifySource {
	pub fn new() -> Self {
		Self::default()
	}
}

impl EventSource for NotifySource {
	fn start(&mut self, root: &Path, tx: RawSender) -> Result<(), SyncError> {
		let watch_root = root.to_path_buf();
		let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
			Ok(event) => {
				if event.need_rescan() {
					let _ = tx.send(Err(SyncError::fatal(format!(
						"Watch queue overflowed under {}, changes were lost",
						watch_root.display()
					))));
					return;
				}
				for raw in map_event(&event) {
					let _ = tx.send(Ok(raw));
				}
			}
			Err(e) => match e.kind {
				notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound => {
					debug!("Transient watch error: {}", e);
				}
				_ => {
					let _ = tx.send(Err(SyncError::fatal(format!("Watch error: {}", e))));
				}
			},
		})
		.map_err(|e| SyncError::fatal(format!("Cannot create watcher: {}", e)))?;

		watcher
			.watch(root, RecursiveMode::Recursive)
			.map_err(|e| SyncError::fatal(format!("Cannot watch {}: {}", root.display(), e)))?;

		self.watcher = Some(watcher);
		Ok(())
	}

	fn stop(&mut self) {
		// dropping the watcher closes the channel
		self.watcher = None;
	}
}

/// Translate one `notify` event into raw events
pub fn map_event(event: &notify::Event) -> Vec<RawEvent> {
	let each = |kind: RawKind| event.paths.iter().map(|p| RawEvent::new(kind, p)).collect::<Vec<_>>();

	match event.kind {
		EventKind::Create(CreateKind::Folder) => each(RawKind::Create { is_dir: Some(true) }),
		EventKind::Create(CreateKind::File) => each(RawKind::Create { is_dir: Some(false) }),
		EventKind::Create(_) => each(RawKind::Create { is_dir: None }),
		EventKind::Remove(RemoveKind::Folder) => each(RawKind::Remove { is_dir: Some(true) }),
		EventKind::Remove(RemoveKind::File) => each(RawKind::Remove { is_dir: Some(false) }),
		EventKind::Remove(_) => each(RawKind::Remove { is_dir: None }),
		EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(RawKind::RenameFrom),
		EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(RawKind::RenameTo),
		EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
			let mut out = Vec::new();
			if let Some(from) = event.paths.first() {
				out.push(RawEvent::new(RawKind::RenameFrom, from));
			}
			if let Some(to) = event.paths.get(1) {
				out.push(RawEvent::new(RawKind::RenameTo, to));
			}
			out
		}
		EventKind::Modify(ModifyKind::Name(_)) => each(RawKind::Any),
		// permission and timestamp changes do not touch content
		EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
		EventKind::Modify(_) => each(RawKind::Modify),
		EventKind::Access(_) => Vec::new(),
		EventKind::Any | EventKind::Other => each(RawKind::Any),
	}
}

/// Source driven by hand, for embedding and tests
#[derive(Clone, Default)]
pub struct ChannelSource {
	tx: Arc<Mutex<Option<RawSender>>>,
}

impl ChannelSource {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns false when the watcher is not running
	pub fn send(&self, event: RawEvent) -> bool {
		self.forward(Ok(event))
	}

	/// Report an unrecoverable source failure
	pub fn fail(&self, error: SyncError) -> bool {
		self.forward(Err(error))
	}

	fn forward(&self, item: Result<RawEvent, SyncError>) -> bool {
		match self.tx.lock() {
			Ok(guard) => guard.as_ref().map(|tx| tx.send(item).is_ok()).unwrap_or(false),
			Err(_) => false,
		}
	}
}

impl EventSource for ChannelSource {
	fn start(&mut self, _root: &Path, tx: RawSender) -> Result<(), SyncError> {
		let mut guard = self.tx.lock().map_err(|_| SyncError::fatal("Event source lock poisoned"))?;
		*guard = Some(tx);
		Ok(())
	}

	fn stop(&mut self) {
		if let Ok(mut guard) = self.tx.lock() {
			*guard = None;
		}
	}
}


// vim: ts=4
