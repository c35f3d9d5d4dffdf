//! Configuration structures for the Modbus TCP server.
//!
//! Supports TOML deserialization with sensible defaults, mirroring the
//! on-disk shape a deployment would hand to the daemon binary.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration.
    pub listen: ListenConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// How the listener accepts connections: run forever on the calling task, or
/// hand back a handle the caller can join or detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Block the caller until the listener stops.
    #[default]
    Foreground,
    /// Spawn the listener as a background task.
    Background,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Host to bind: an IPv4/IPv6 literal or a bindable hostname.
    pub host: String,

    /// TCP port to bind. Conventionally 502, which requires elevated
    /// privileges on most systems; any port is accepted here.
    pub port: u16,

    /// Foreground vs. background run mode.
    pub run_mode: RunMode,

    /// Soft cap on simultaneous connections. Exceeding it never rejects a
    /// connection — it only surfaces in the `soft_limit_exceeded` metric, so
    /// an operator can see pressure building without the server imposing a
    /// hard limit.
    pub max_connections: Option<u32>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 502,
            run_mode: RunMode::Foreground,
            max_connections: None,
        }
    }
}

impl ListenConfig {
    /// Render `host:port` for use with `ToSocketAddrs`.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // Bare IPv6 literal; bracket it for the "host:port" form.
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, or error.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}
