//! The accept loop: binds a `TcpListener` and spawns one session task per
//! accepted connection, sharing a single [`DataBank`] and [`Metrics`]
//! instance across all of them.

use std::sync::Arc;

use mbsrv_common::ServerError;
use mbsrv_core::DataBank;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::metrics::Metrics;
use crate::session::handle_connection;
use crate::signals::ShutdownHandle;

/// A bound Modbus TCP listener, ready to accept connections.
pub struct Listener {
    inner: TcpListener,
    addr: String,
    bank: Arc<DataBank>,
    metrics: Arc<Metrics>,
    shutdown: ShutdownHandle,
    max_connections: Option<u32>,
}

impl Listener {
    /// Bind `addr` (as produced by [`mbsrv_common::ListenConfig::socket_addr`]).
    ///
    /// `max_connections` is a soft cap: crossing it is only recorded in
    /// [`Metrics::snapshot`]'s `soft_limit_exceeded` counter, never enforced.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(
        addr: &str,
        bank: Arc<DataBank>,
        metrics: Arc<Metrics>,
        shutdown: ShutdownHandle,
        max_connections: Option<u32>,
    ) -> Result<Self, ServerError> {
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        info!(%addr, "listening");

        Ok(Self {
            inner,
            addr: addr.to_string(),
            bank,
            metrics,
            shutdown,
            max_connections,
        })
    }

    /// The address actually bound (useful when `addr` used port 0).
    #[must_use]
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.inner.local_addr()
    }

    /// Run the accept loop on the calling task until shutdown is requested.
    ///
    /// Each accepted connection is handled on its own spawned task; this
    /// loop never blocks on a single session.
    pub async fn run(self) {
        let Listener {
            inner,
            addr,
            bank,
            metrics,
            mut shutdown,
            max_connections,
        } = self;

        loop {
            tokio::select! {
                biased;
                () = shutdown.wait() => {
                    info!(%addr, "shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = inner.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let bank = bank.clone();
                            let metrics = metrics.clone();
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                handle_connection(
                                    stream,
                                    peer,
                                    bank,
                                    metrics,
                                    shutdown,
                                    max_connections,
                                )
                                .await;
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                        }
                    }
                }
            }
        }
    }

    /// Spawn [`Listener::run`] as a background task and return its handle,
    /// for callers that want to keep doing other work on the calling task
    /// (the `background` run mode).
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_an_ephemeral_port() {
        let bank = Arc::new(DataBank::new());
        let metrics = Arc::new(Metrics::new());
        let shutdown = ShutdownHandle::new();

        let listener = Listener::bind("127.0.0.1:0", bank, metrics, shutdown, None)
            .await
            .unwrap();
        assert!(listener.local_addr().unwrap().port() > 0);
    }

    #[tokio::test]
    async fn shutdown_stops_the_accept_loop() {
        let bank = Arc::new(DataBank::new());
        let metrics = Arc::new(Metrics::new());
        let shutdown = ShutdownHandle::new();

        let listener = Listener::bind("127.0.0.1:0", bank, metrics, shutdown.clone(), None)
            .await
            .unwrap();
        let handle = listener.spawn();

        shutdown.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("accept loop should stop promptly after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_an_address_that_fails_to_bind() {
        let bank = Arc::new(DataBank::new());
        let metrics = Arc::new(Metrics::new());
        let shutdown = ShutdownHandle::new();

        let first = Listener::bind(
            "127.0.0.1:0",
            bank.clone(),
            metrics.clone(),
            shutdown.clone(),
            None,
        )
        .await
        .unwrap();
        let addr = first.local_addr().unwrap().to_string();

        let second = Listener::bind(&addr, bank, metrics, shutdown, None).await;
        assert!(matches!(second, Err(ServerError::Bind { .. })));
    }
}
