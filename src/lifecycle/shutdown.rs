//! Signal handling for graceful shutdown

use tokio::signal::unix::{signal, SignalKind};
use tracing::debug;

/// Handles shutdown signals (SIGTERM, SIGINT, SIGHUP)
#[derive(Debug, Default)]
pub struct ShutdownSignal;

impl ShutdownSignal {
    pub fn new() -> Self {
        Self
    }

    /// Wait for a shutdown signal
    ///
    /// Fails only if a handler cannot be registered.
    pub async fn wait(&self) -> std::io::Result<()> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;

        tokio::select! {
            _ = sigterm.recv() => debug!("received SIGTERM"),
            _ = sigint.recv() => debug!("received SIGINT"),
            _ = sighup.recv() => debug!("received SIGHUP"),
        }

        Ok(())
    }
}
