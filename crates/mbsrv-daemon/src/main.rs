//! Modbus TCP daemon entry point.
//!
//! Wires together configuration loading, logging, the shared data bank, and
//! the listener, and waits for a shutdown signal before exiting.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mbsrv_common::{init_logging, ListenConfig, RunMode, ServerConfig};
use mbsrv_core::DataBank;
use mbsrv_daemon::{watch_for_shutdown_signal, Listener, Metrics, ShutdownHandle};
use tracing::info;

/// Modbus TCP server command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "mbsrv-daemon",
    about = "Modbus TCP (MBAP) server daemon",
    version,
    long_about = None
)]
struct Args {
    /// Path to a server configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Host or address to bind (overrides config file).
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// TCP port to bind (overrides config file).
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "starting mbsrv-daemon");

    let mut config = load_config(&args)?;

    if let Some(host) = &args.host {
        config.listen.host = host.clone();
    }
    if let Some(port) = args.port {
        config.listen.port = port;
    }

    info!(addr = %config.listen.socket_addr(), run_mode = ?config.listen.run_mode, "configuration loaded");

    run_server(config).await
}

/// Load configuration from file or fall back to built-in defaults.
fn load_config(args: &Args) -> Result<ServerConfig> {
    if let Some(config_path) = &args.config {
        ServerConfig::from_file(config_path)
            .with_context(|| format!("failed to load config from {config_path:?}"))
    } else {
        let default_path = PathBuf::from("config/default.toml");
        if default_path.exists() {
            info!(?default_path, "using default configuration file");
            ServerConfig::from_file(&default_path)
                .with_context(|| format!("failed to load default config from {default_path:?}"))
        } else {
            info!("no config file found, using built-in defaults");
            Ok(ServerConfig::default())
        }
    }
}

/// Bind the listener, install shutdown signal handling, and run until the
/// daemon is asked to stop.
async fn run_server(config: ServerConfig) -> Result<()> {
    let ListenConfig {
        run_mode,
        max_connections,
        ..
    } = config.listen.clone();

    let bank = Arc::new(DataBank::new());
    let metrics = Arc::new(Metrics::new());
    let shutdown = ShutdownHandle::new();

    tokio::spawn(watch_for_shutdown_signal(shutdown.clone()));

    let listener = Listener::bind(
        &config.listen.socket_addr(),
        bank,
        metrics.clone(),
        shutdown.clone(),
        max_connections,
    )
    .await
    .with_context(|| format!("failed to bind {}", config.listen.socket_addr()))?;

    match run_mode {
        RunMode::Foreground => {
            listener.run().await;
        }
        RunMode::Background => {
            let handle = listener.spawn();
            shutdown_or_handle(shutdown, handle).await;
        }
    }

    let snapshot = metrics.snapshot();
    info!(
        connections = snapshot.connections_accepted,
        requests = snapshot.requests_dispatched,
        exceptions = snapshot.exceptions_raised,
        "daemon shutdown complete"
    );

    Ok(())
}

async fn shutdown_or_handle(mut shutdown: ShutdownHandle, handle: tokio::task::JoinHandle<()>) {
    shutdown.wait().await;
    let _ = handle.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_with_defaults() {
        let args = Args::parse_from(["mbsrv-daemon"]);
        assert!(args.config.is_none());
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn args_parse_with_overrides() {
        let args = Args::parse_from([
            "mbsrv-daemon",
            "-c",
            "mbsrv.toml",
            "--host",
            "127.0.0.1",
            "-p",
            "1502",
            "-l",
            "debug",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("mbsrv.toml")));
        assert_eq!(args.host, Some("127.0.0.1".to_string()));
        assert_eq!(args.port, Some(1502));
        assert_eq!(args.log_level, "debug");
    }

    #[test]
    fn default_config_binds_to_standard_modbus_port() {
        let config = ServerConfig::default();
        assert_eq!(config.listen.port, 502);
    }
}
