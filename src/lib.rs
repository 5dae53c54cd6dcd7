//! # themesync - theme mirroring and diffing
//!
//! themesync keeps a local working copy of a project's theme folder in sync
//! with the source, and compares that copy against a reference release of
//! the Atlas UI framework.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use themesync::{commands, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     commands::sync(&config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Comparing two trees
//!
//! ```rust,ignore
//! use themesync::compare::{compare, CompareOptions};
//! use themesync::report::DiffReportBuilder;
//!
//! let records = compare("atlasui".as_ref(), "theme".as_ref(), &CompareOptions::default())?;
//! DiffReportBuilder::new("diff/diff.json").build_and_write(records).await?;
//! ```

pub mod commands;
pub mod compare;
pub mod config;
pub mod error;
pub mod exclusion;
pub mod fetch;
pub mod logging;
pub mod manifest;
pub mod mirror;
pub mod propagator;
pub mod report;
pub mod types;
pub mod utils;
pub mod validation;
pub mod watcher;

// Re-export commonly used types and functions
pub use config::{Config, SyncOptions};
pub use error::SyncError;
pub use exclusion::PathFilter;
pub use propagator::{PropagationStats, SyncPropagator};
pub use types::{ChangeEvent, ChangeKind, DiffRecord, DiffState, EntryType};
pub use watcher::{ChangeWatcher, WatchHandle};

// vim: ts=4
