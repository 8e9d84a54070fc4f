//! Change-feed rows served by pull.

use crate::conflict::EntityKey;
use crate::credentials::DeviceCredentials;
use casebook_model::{Drawing, Event, Note, Record};
use serde::{Deserialize, Serialize};

/// A server-side entity change, in the shape the local cache mirrors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangedEntity {
    /// A record changed.
    Record(Record),
    /// An event changed.
    Event(Event),
    /// A note changed.
    Note(Note),
    /// A drawing changed.
    Drawing(Drawing),
}

impl ChangedEntity {
    /// Returns the natural key of the changed row.
    pub fn key(&self) -> EntityKey {
        match self {
            ChangedEntity::Record(r) => EntityKey::Record(r.record_id),
            ChangedEntity::Event(e) => EntityKey::Event(e.id),
            ChangedEntity::Note(n) => EntityKey::Note(n.record_id),
            ChangedEntity::Drawing(d) => EntityKey::Drawing(d.key),
        }
    }
}

/// One row of the server change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRow {
    /// Position in the server change log; strictly increasing.
    pub sequence: u64,
    /// The changed entity, in its state after the change.
    pub entity: ChangedEntity,
}

/// Pull request: changes since a cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Device credentials.
    pub credentials: DeviceCredentials,
    /// Highest change-log sequence the client has already applied.
    pub cursor: u64,
    /// Maximum number of rows to return.
    pub limit: u32,
}

/// Pull response: a page of changed rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Rows changed since the cursor, in change-log order.
    pub rows: Vec<ChangeRow>,
    /// Cursor to resume from.
    pub new_cursor: u64,
    /// Whether more rows exist beyond this page.
    pub has_more: bool,
}
