//! Version conflicts and their resolution.

use casebook_model::{Drawing, DrawingKey, Event, EventId, Note, Record, RecordId, Version};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The server's authoritative state, returned on a version mismatch.
///
/// Carrying the current entity alongside the version lets the caller resolve
/// the conflict without a second round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionConflict<T> {
    /// The version currently stored on the server.
    pub server_version: Version,
    /// The entity currently stored on the server.
    pub server_entity: T,
}

/// Outcome of a versioned upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpsertOutcome<T> {
    /// The write was accepted.
    Applied {
        /// The entity as stored.
        entity: T,
        /// The version after the write.
        new_version: Version,
    },
    /// The expected version did not match; nothing was written.
    Conflict(VersionConflict<T>),
}

impl<T> UpsertOutcome<T> {
    /// Returns true if the write was accepted.
    pub fn is_applied(&self) -> bool {
        matches!(self, UpsertOutcome::Applied { .. })
    }

    /// Extracts the conflict payload, if any.
    pub fn into_conflict(self) -> Option<VersionConflict<T>> {
        match self {
            UpsertOutcome::Applied { .. } => None,
            UpsertOutcome::Conflict(conflict) => Some(conflict),
        }
    }
}

/// Natural key addressing any versioned entity on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKey {
    /// A record, by canonical identity.
    Record(RecordId),
    /// An event, by identity.
    Event(EventId),
    /// A note, keyed by its owning record.
    Note(RecordId),
    /// A drawing, by composite natural key.
    Drawing(DrawingKey),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Record(id) => write!(f, "record/{id}"),
            EntityKey::Event(id) => write!(f, "event/{id}"),
            EntityKey::Note(id) => write!(f, "note/{id}"),
            EntityKey::Drawing(key) => write!(f, "drawing/{key}"),
        }
    }
}

/// A full entity body, used where the wire must carry any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityPayload {
    /// A record body.
    Record(Record),
    /// An event body.
    Event(Event),
    /// A note body.
    Note(Note),
    /// A drawing body.
    Drawing(Drawing),
}

impl EntityPayload {
    /// Returns the natural key of the carried entity.
    pub fn key(&self) -> EntityKey {
        match self {
            EntityPayload::Record(r) => EntityKey::Record(r.record_id),
            EntityPayload::Event(e) => EntityKey::Event(e.id),
            EntityPayload::Note(n) => EntityKey::Note(n.record_id),
            EntityPayload::Drawing(d) => EntityKey::Drawing(d.key),
        }
    }

    /// Returns the version carried by the entity body.
    pub fn version(&self) -> Version {
        match self {
            EntityPayload::Record(r) => r.version,
            EntityPayload::Event(e) => e.version,
            EntityPayload::Note(n) => n.version,
            EntityPayload::Drawing(d) => d.version,
        }
    }
}

/// The binary resolution choice for a surfaced conflict.
///
/// The engine never merges fields. The resolution layer either adopts the
/// server's state or resubmits the local state with the server's version as
/// the new expected version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Discard the local change and adopt the server state.
    KeepServer,
    /// Overwrite the server with the local state.
    KeepMine,
}
