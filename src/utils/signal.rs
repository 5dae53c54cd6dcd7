//! Signal handling for graceful termination

use crate::logging::*;

/// Termination request received from the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
	Interrupt,
	Terminate,
}

/// Resolve on the first SIGINT or SIGTERM
///
/// A handler that cannot be installed is logged and left out; if neither can
/// be installed the future never resolves.
#[cfg(unix)]
pub async fn shutdown_signal() -> Shutdown {
	use tokio::signal::unix::{signal, SignalKind};

	let mut sigterm = match signal(SignalKind::terminate()) {
		Ok(stream) => Some(stream),
		Err(e) => {
			warn!("Failed to setup SIGTERM handler: {}", e);
			None
		}
	};
	let mut sigint = match signal(SignalKind::interrupt()) {
		Ok(stream) => Some(stream),
		Err(e) => {
			warn!("Failed to setup SIGINT handler: {}", e);
			None
		}
	};

	tokio::select! {
		Some(_) = async { sigterm.as_mut()?.recv().await } => {
			debug!("Received SIGTERM, shutting down");
			Shutdown::Terminate
		}
		Some(_) = async { sigint.as_mut()?.recv().await } => {
			debug!("Received SIGINT, shutting down");
			Shutdown::Interrupt
		}
		else => std::future::pending().await,
	}
}

#[cfg(not(unix))]
pub async fn shutdown_signal() -> Shutdown {
	if let Err(e) = tokio::signal::ctrl_c().await {
		warn!("Failed to setup Ctrl-C handler: {}", e);
		std::future::pending::<()>().await;
	}
	debug!("Received Ctrl-C, shutting down");
	Shutdown::Interrupt
}

// vim: ts=4
