//! Transport layer errors.

use std::io;
use thiserror::Error;

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error from the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connection is closed.
    #[error("transport is closed")]
    Closed,

    /// Dialing the remote endpoint failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Endpoint URL could not be used.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// WebSocket protocol error.
    #[error("websocket error: {0}")]
    WebSocket(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
