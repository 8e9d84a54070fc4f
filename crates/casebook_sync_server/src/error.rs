//! Error types for the sync server.

use casebook_model::{BookId, EventId, RecordId, Version};
use casebook_protocol::{EntityKey, EntityPayload};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while handling sync requests.
///
/// A read miss is deliberately absent: point lookups return `Option` so
/// callers can distinguish "no note yet" from a failure.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A request referenced a book that does not exist.
    #[error("unknown book {0}")]
    UnknownBook(BookId),

    /// A request referenced a record that does not exist.
    #[error("unknown record {0}")]
    UnknownRecord(RecordId),

    /// A request referenced an event that does not exist.
    #[error("unknown event {0}")]
    UnknownEvent(EventId),

    /// A malformed key or missing required field.
    #[error("validation error: {0}")]
    Validation(String),

    /// An expected version did not match the stored version.
    ///
    /// Carries the server's current state so the caller can resolve without
    /// a second round trip.
    #[error("version conflict on {key} (server at {server_version})")]
    Conflict {
        /// Natural key of the conflicted entity.
        key: EntityKey,
        /// The version currently stored.
        server_version: Version,
        /// The entity currently stored.
        server_state: Box<EntityPayload>,
    },

    /// Credential or ownership check failed.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A batch exceeded the combined item limit.
    #[error("payload too large: {items} items exceeds limit of {limit}")]
    PayloadTooLarge {
        /// Items in the rejected request.
        items: usize,
        /// The configured limit.
        limit: usize,
    },

    /// Unexpected storage failure; any enclosing transaction was rolled back.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// The HTTP status an HTTP-speaking transport would map this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::UnknownBook(_)
            | ServerError::UnknownRecord(_)
            | ServerError::UnknownEvent(_) => 404,
            ServerError::Validation(_) => 400,
            ServerError::Conflict { .. } => 409,
            ServerError::Forbidden(_) => 403,
            ServerError::PayloadTooLarge { .. } => 413,
            ServerError::Internal(_) => 500,
        }
    }
}
