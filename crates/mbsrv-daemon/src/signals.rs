//! Graceful-shutdown signal handling for the daemon binary.
//!
//! Unlike the synchronous poll-a-static-flag approach a blocking daemon
//! needs, an async server can simply race `tokio::signal` futures; this
//! wraps that race behind the same `ShutdownHandle` shape so the listener
//! doesn't need to know which signal fired.

use tokio::sync::watch;
use tracing::info;

/// Handle for observing and triggering shutdown.
///
/// Cloning is cheap (it clones a [`watch::Receiver`]/[`watch::Sender`] pair)
/// so every session task can hold one without extra synchronization.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    /// Create a new, not-yet-triggered shutdown handle.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Has shutdown been requested?
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested. Safe to call from many
    /// tasks concurrently; every caller is woken.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|shutting_down| *shutting_down).await;
    }

    /// Trigger shutdown, waking every waiter.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for SIGTERM (Unix) or Ctrl+C, then trigger `handle`.
///
/// Spawned as its own task; runs for the lifetime of the daemon.
pub async fn watch_for_shutdown_signal(handle: ShutdownHandle) {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(sig) => sig,
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                info!("Ctrl+C received, shutting down");
                handle.shutdown();
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
            _ = tokio::signal::ctrl_c() => info!("Ctrl+C received, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down");
    }

    handle.shutdown();
}
