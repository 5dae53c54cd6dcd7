//! Utility modules for common functionality

pub mod signal;

pub use signal::{shutdown_signal, Shutdown};

// vim: ts=4
