//! Error types for neboloop-comms.

use thiserror::Error;

/// Main error type for all comms operations.
#[derive(Debug, Error)]
pub enum CommsError {
    /// Protocol violation (bad version, short header, truncated payload, unexpected reply).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Payload exceeds the wire limit. Never truncated.
    #[error("Payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Offending payload size in bytes.
        size: usize,
        /// Allowed maximum in bytes.
        max: usize,
    },

    /// JSON marshal/unmarshal failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compression or decompression failure.
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error while reading a frame from a byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Dial, read or write failure on the socket.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A write did not complete before its deadline.
    #[error("Write timed out")]
    WriteTimeout,

    /// No live connection to write to.
    #[error("Not connected")]
    NotConnected,

    /// Dial plus auth did not complete before the connect deadline.
    #[error("Connect timed out")]
    ConnectTimeout,

    /// The gateway rejected our credentials. Terminal, never retried.
    #[error("Authentication failed: {reason} ({code})")]
    Auth {
        /// Human readable rejection reason.
        reason: String,
        /// Gateway error code.
        code: String,
    },

    /// The client was closed.
    #[error("Client closed")]
    Closed,

    /// Handler-level failure. Logged by the read loop, never propagated.
    #[error("Handler error: {0}")]
    Handler(String),
}

impl CommsError {
    /// True for errors that mean the socket is gone.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CommsError::Transport(_) | CommsError::WriteTimeout | CommsError::Io(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CommsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        CommsError::Transport(err.to_string())
    }
}

/// Result type alias using CommsError.
pub type Result<T> = std::result::Result<T, CommsError>;
