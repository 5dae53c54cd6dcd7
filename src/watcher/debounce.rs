//! Coalescing of normalized change events
//!
//! Events are held until the source has been quiet for the debounce window
//! (or the oldest pending event reaches the maximum delay) and then released
//! as one batch, ordered by when each path was first seen. Per path the
//! pending history is compacted to at most two operations:
//!
//! - copy, copy       -> the first copy
//! - copy, removal    -> the removal
//! - removal, removal -> the last removal
//! - file removal, copy      -> `Modified`
//! - directory removal, copy -> both, so stale children are dropped first
//!
//! A directory removal drops pending events of its descendants, and later
//! descendant removals in the same batch are suppressed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::{ChangeEvent, ChangeKind};

/// Upper bound on how long events may be held under continuous activity,
/// in multiples of the debounce window
const MAX_DELAY_FACTOR: u32 = 10;

#[derive(Debug)]
struct Pending {
	first_seq: u64,
	kinds: Vec<ChangeKind>,
}

impl Pending {
	fn last(&self) -> Option<ChangeKind> {
		self.kinds.last().copied()
	}

	fn push(&mut self, kind: ChangeKind) {
		let last = match self.last() {
			Some(last) => last,
			None => {
				self.kinds.push(kind);
				return;
			}
		};

		match (last.is_removal(), kind.is_removal()) {
			// copy after copy: one copy of the final content
			(false, false) => {}
			// removal supersedes any pending copy
			(false, true) => {
				self.kinds.retain(|k| k.is_removal());
				match self.kinds.last_mut() {
					Some(prev) => *prev = kind,
					None => self.kinds.push(kind),
				}
			}
			(true, true) => {
				if let Some(prev) = self.kinds.last_mut() {
					*prev = kind;
				}
			}
			(true, false) => {
				if last == ChangeKind::DeletedDirectory {
					self.kinds.push(kind);
				} else {
					self.kinds.pop();
					self.kinds.push(if self.kinds.is_empty() { ChangeKind::Modified } else { kind });
				}
			}
		}
	}
}

/// Pending-event table of the watcher
#[derive(Debug)]
pub struct Coalescer {
	window: Duration,
	max_delay: Duration,
	pending: HashMap<PathBuf, Pending>,
	next_seq: u64,
	last_event: Option<Instant>,
	oldest_pending: Option<Instant>,
}

impl Coalescer {
	pub fn new(window: Duration) -> Self {
		Coalescer {
			window,
			max_delay: window * MAX_DELAY_FACTOR,
			pending: HashMap::new(),
			next_seq: 0,
			last_event: None,
			oldest_pending: None,
		}
	}

	#[cfg(test)]
	fn is_empty(&self) -> bool {
		self.pending.is_empty()
	}

	/// Record one event observed at `now`
	pub fn push(&mut self, event: ChangeEvent, now: Instant) {
		self.last_event = Some(now);
		let path = event.relative_path;

		if event.kind.is_removal() && self.covered_by_directory_removal(&path) {
			return;
		}

		if event.kind == ChangeKind::DeletedDirectory {
			self.pending.retain(|p, _| !(p.starts_with(&path) && p != &path));
		}

		let seq = self.next_seq;
		self.next_seq += 1;
		self.pending.entry(path).or_insert_with(|| Pending { first_seq: seq, kinds: Vec::new() }).push(event.kind);

		if self.oldest_pending.is_none() {
			self.oldest_pending = Some(now);
		}
	}

	/// A strict ancestor has a pending directory removal as its last operation
	fn covered_by_directory_removal(&self, path: &std::path::Path) -> bool {
		path.ancestors().skip(1).any(|ancestor| {
			self.pending
				.get(ancestor)
				.map(|p| p.last() == Some(ChangeKind::DeletedDirectory))
				.unwrap_or(false)
		})
	}

	/// When the current batch becomes ready, if anything is pending
	pub fn next_flush(&self) -> Option<Instant> {
		if self.pending.is_empty() {
			return None;
		}
		let quiet = self.last_event.map(|t| t + self.window);
		let capped = self.oldest_pending.map(|t| t + self.max_delay);
		match (quiet, capped) {
			(Some(q), Some(c)) => Some(q.min(c)),
			(q, c) => q.or(c),
		}
	}

	/// Release the batch if it is ready at `now`
	pub fn drain_ready(&mut self, now: Instant) -> Vec<ChangeEvent> {
		match self.next_flush() {
			Some(at) if now >= at => self.drain_all(),
			_ => Vec::new(),
		}
	}

	/// Release everything pending, ordered by first sighting
	pub fn drain_all(&mut self) -> Vec<ChangeEvent> {
		let mut entries: Vec<(PathBuf, Pending)> = self.pending.drain().collect();
		entries.sort_by_key(|(_, p)| p.first_seq);
		self.oldest_pending = None;

		entries
			.into_iter()
			.flat_map(|(path, pending)| {
				pending.kinds.into_iter().map(move |kind| ChangeEvent::new(kind, path.clone()))
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const WINDOW: Duration = Duration::from_millis(50);

	fn ev(kind: ChangeKind, path: &str) -> ChangeEvent {
		ChangeEvent::new(kind, path)
	}

	#[test]
	fn test_burst_collapses_to_one() {
		let mut c = Coalescer::new(WINDOW);
		let t0 = Instant::now();
		for i in 0..5 {
			c.push(ev(ChangeKind::Modified, "a.txt"), t0 + Duration::from_millis(i * 5));
		}

		assert!(c.drain_ready(t0 + Duration::from_millis(30)).is_empty());
		let out = c.drain_ready(t0 + Duration::from_millis(20 + 50));
		assert_eq!(out, vec![ev(ChangeKind::Modified, "a.txt")]);
		assert!(c.is_empty());
		assert_eq!(c.next_flush(), None);
	}

	#[test]
	fn test_created_then_modified_stays_created() {
		let mut c = Coalescer::new(WINDOW);
		let t0 = Instant::now();
		c.push(ev(ChangeKind::Created, "a.txt"), t0);
		c.push(ev(ChangeKind::Modified, "a.txt"), t0);

		assert_eq!(c.drain_all(), vec![ev(ChangeKind::Created, "a.txt")]);
	}

	#[test]
	fn test_copy_then_delete_is_delete() {
		let mut c = Coalescer::new(WINDOW);
		let t0 = Instant::now();
		c.push(ev(ChangeKind::Created, "a.txt"), t0);
		c.push(ev(ChangeKind::Modified, "a.txt"), t0);
		c.push(ev(ChangeKind::DeletedFile, "a.txt"), t0);

		assert_eq!(c.drain_all(), vec![ev(ChangeKind::DeletedFile, "a.txt")]);
	}

	#[test]
	fn test_file_replaced_is_modified() {
		let mut c = Coalescer::new(WINDOW);
		let t0 = Instant::now();
		c.push(ev(ChangeKind::DeletedFile, "a.txt"), t0);
		c.push(ev(ChangeKind::Created, "a.txt"), t0);

		assert_eq!(c.drain_all(), vec![ev(ChangeKind::Modified, "a.txt")]);
	}

	#[test]
	fn test_directory_replaced_keeps_both() {
		let mut c = Coalescer::new(WINDOW);
		let t0 = Instant::now();
		c.push(ev(ChangeKind::DeletedDirectory, "sub"), t0);
		c.push(ev(ChangeKind::Created, "sub"), t0);
		c.push(ev(ChangeKind::Modified, "sub"), t0);

		assert_eq!(
			c.drain_all(),
			vec![ev(ChangeKind::DeletedDirectory, "sub"), ev(ChangeKind::Created, "sub")]
		);
	}

	#[test]
	fn test_directory_removal_swallows_descendants() {
		let mut c = Coalescer::new(WINDOW);
		let t0 = Instant::now();
		c.push(ev(ChangeKind::Modified, "sub/b.txt"), t0);
		c.push(ev(ChangeKind::DeletedFile, "sub/deep/c.txt"), t0);
		c.push(ev(ChangeKind::Modified, "subway.txt"), t0);
		c.push(ev(ChangeKind::DeletedDirectory, "sub"), t0);
		// late descendant removals are already covered
		c.push(ev(ChangeKind::DeletedFile, "sub/late.txt"), t0);
		c.push(ev(ChangeKind::DeletedDirectory, "sub/deep"), t0);

		assert_eq!(
			c.drain_all(),
			vec![ev(ChangeKind::Modified, "subway.txt"), ev(ChangeKind::DeletedDirectory, "sub")]
		);
	}

	#[test]
	fn test_creation_under_removed_directory_follows_it() {
		let mut c = Coalescer::new(WINDOW);
		let t0 = Instant::now();
		c.push(ev(ChangeKind::DeletedDirectory, "sub"), t0);
		c.push(ev(ChangeKind::Created, "sub/new.txt"), t0);

		assert_eq!(
			c.drain_all(),
			vec![ev(ChangeKind::DeletedDirectory, "sub"), ev(ChangeKind::Created, "sub/new.txt")]
		);
	}

	#[test]
	fn test_batch_order_by_first_sighting() {
		let mut c = Coalescer::new(WINDOW);
		let t0 = Instant::now();
		c.push(ev(ChangeKind::Modified, "b.txt"), t0);
		c.push(ev(ChangeKind::Modified, "a.txt"), t0);
		c.push(ev(ChangeKind::Modified, "b.txt"), t0);

		assert_eq!(
			c.drain_all(),
			vec![ev(ChangeKind::Modified, "b.txt"), ev(ChangeKind::Modified, "a.txt")]
		);
	}

	#[test]
	fn test_continuous_activity_is_capped() {
		let mut c = Coalescer::new(WINDOW);
		let t0 = Instant::now();
		let mut t = t0;
		// an event every 40ms keeps the quiet window from ever elapsing
		while t < t0 + WINDOW * MAX_DELAY_FACTOR {
			c.push(ev(ChangeKind::Modified, "hot.txt"), t);
			t += Duration::from_millis(40);
		}

		assert_eq!(c.next_flush(), Some(t0 + WINDOW * MAX_DELAY_FACTOR));
		assert_eq!(c.drain_ready(t0 + WINDOW * MAX_DELAY_FACTOR).len(), 1);
	}
}

// vim: ts=4
