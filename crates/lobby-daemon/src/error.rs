//! Error types for lobby-daemon

use lobby_types::{LobbyError, StoreError};
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Lobby error: {0}")]
    Lobby(#[from] LobbyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Console error: {0}")]
    Console(String),
}

impl From<config::ConfigError> for DaemonError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
