#![doc = "Shared error types, configuration, and logging for the Modbus TCP server."]

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
pub use logging::init_logging;
