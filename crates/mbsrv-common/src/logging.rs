//! Logging initialization shared by the daemon binary and its tests.

/// Initialize `tracing` with an `EnvFilter` seeded from `level`, falling back
/// to `RUST_LOG` when it is set.
///
/// Safe to call more than once within a process (e.g. across integration
/// tests); subsequent calls are no-ops.
pub fn init_logging(level: &str) {
    let filter = format!("mbsrv_daemon={level},mbsrv_core={level},mbsrv_common={level}");

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(true)
        .try_init();
}
