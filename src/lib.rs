//! Self-healing Binance WebSocket streams
//!
//! Keeps many long-lived market-data and user-data connections alive across
//! network failures. Each logical stream owns one reconnecting session; the
//! manager enforces one session per stream and rotates the user-data listen key.

pub mod core;
pub mod infrastructure;
pub mod manager;
pub mod rest;
pub mod ws;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use crate::core::{streams, Route, StreamId};
pub use infrastructure::config::{Config, ConfigError, StreamConfig};
pub use manager::StreamManager;
pub use rest::{CredentialSource, ListenKeyClient, RestError};
pub use ws::{handler_fn, MessageHandler, SessionState, SharedHandler, StreamMessage};

use thiserror::Error;

/// Main error type for the stream connector
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Transport error: {0}")]
    Transport(#[from] ws::TransportError),

    #[error("Credential error: {0}")]
    Credentials(#[from] RestError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StreamError>;
