//! Logging prelude module for convenient access to tracing macros.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Added - {}", path.display());
//! warn!("Cannot read {}", path.display());
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// `default_level` applies when `RUST_LOG` is not set:
///
/// ```bash
/// RUST_LOG=debug themesync start
/// RUST_LOG=themesync::propagator=trace themesync start
/// ```
pub fn init_tracing(default_level: &str) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

	// try_init: tests and embedding callers may have installed a subscriber already
	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_writer(std::io::stderr)
		.try_init();
}
