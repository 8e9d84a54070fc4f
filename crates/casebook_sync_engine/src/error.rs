//! Error types for the client-side engine.

use casebook_protocol::ProtocolError;
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during synchronization.
///
/// A version conflict is not an error: conflicts are collected into the
/// sync report and wait for an explicit resolution.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The transport could not reach the server.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server did not answer within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a non-conflict failure status.
    #[error("server error {status}: {message}")]
    Server {
        /// Status code as an HTTP-speaking transport reported it.
        status: u16,
        /// Server-provided message.
        message: String,
    },

    /// The device failed the server's credential check.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A wire payload could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Reading or writing the cache snapshot failed.
    #[error("cache snapshot error: {0}")]
    Snapshot(#[from] std::io::Error),

    /// The sync cycle was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Whether a retry with backoff could plausibly succeed.
    ///
    /// Credential failures, malformed payloads, and cancellation are final;
    /// connectivity loss, timeouts, and server 5xx are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport(_) | SyncError::Timeout => true,
            SyncError::Server { status, .. } => *status >= 500,
            SyncError::Forbidden(_)
            | SyncError::Protocol(_)
            | SyncError::Snapshot(_)
            | SyncError::Cancelled => false,
        }
    }
}
