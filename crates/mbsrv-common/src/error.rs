use thiserror::Error;

/// Top-level server error types covering configuration and daemon faults.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Binding the listening socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the listener tried to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Generic I/O fault outside of a single session.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for server-level operations.
pub type ServerResult<T> = Result<T, ServerError>;
