//! Error types.

use thiserror::Error;

/// Failures in the sync layer. None of these are fatal; at worst local
/// state is stale until the next full snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Endpoint discovery failed: {0}")]
    Discovery(String),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
    #[error("Send dropped, connection not open")]
    DroppedSend,
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("Cell size must be non-zero")]
    ZeroCellSize,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}
