//! Error types for mythwire-client.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all mythwire operations.
///
/// Failures that happen while a session is running are not reported through
/// this type: they close the session and surface as events (see
/// [`Event`](crate::Event)) and a [`CloseReason`](crate::CloseReason).
#[derive(Debug, Error)]
pub enum MythwireError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading a configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Framing error (length field overflow, malformed header, etc.).
    #[error("Framing error: {0}")]
    Framing(String),

    /// Invalid connection configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The session closed before the backend accepted the monitor.
    #[error("Connection to backend failed")]
    ConnectFailed,

    /// The connect budget elapsed before the backend accepted the monitor.
    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The caller cancelled a pending connect.
    #[error("Connect cancelled")]
    Cancelled,
}

/// Result type alias using MythwireError.
pub type Result<T> = std::result::Result<T, MythwireError>;
