//! Books: the top-level container.

use crate::ids::BookId;
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named container scoping records, events, and drawings.
///
/// Books are created by devices with a client-minted UUID; the server accepts
/// the identifier as-is so that an offline create never collides with another
/// device. Archiving is soft: an archived book is hidden from the default
/// listing but never destroyed implicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Global identity, assigned at creation.
    pub id: BookId,
    /// Display name.
    pub name: String,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// When the book was archived, if it has been.
    pub archived_at: Option<DateTime<Utc>>,
    /// Optimistic-locking version.
    pub version: Version,
}

impl Book {
    /// Creates a new book at version 1.
    pub fn new(id: BookId, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            created_at,
            archived_at: None,
            version: Version::FIRST,
        }
    }

    /// Returns true if the book has been archived.
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}
