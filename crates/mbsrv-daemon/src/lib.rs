#![doc = "Async Modbus TCP daemon: session handler, listener, metrics, and shutdown signals."]

pub mod listener;
pub mod metrics;
pub mod session;
pub mod signals;

pub use listener::Listener;
pub use metrics::{CloseReason, Metrics, MetricsSnapshot};
pub use signals::{watch_for_shutdown_signal, ShutdownHandle};
