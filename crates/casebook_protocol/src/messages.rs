//! Endpoint request and response types.
//!
//! Status mapping for transports that speak HTTP: `Applied`/`Saved` bodies
//! ride a 200, version conflicts a 409, ownership failures a 403, oversized
//! batches a 413, and validation failures a 400.

use crate::conflict::{ConflictResolution, EntityKey, EntityPayload, VersionConflict};
use crate::credentials::DeviceCredentials;
use casebook_model::{
    BookId, Drawing, DrawingKey, Event, EventId, EventType, Note, Page, Record, RecordId, Stroke,
    Version, ViewMode,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Maximum combined item count accepted by `batch-save`.
///
/// Oversized batches are rejected before any write, never truncated.
pub const MAX_BATCH_ITEMS: usize = 1000;

// ---------------------------------------------------------------------------
// Record identity
// ---------------------------------------------------------------------------

/// The identity material a caller presents to resolve a record.
///
/// With a non-empty `record_number` the number is the identity key and the
/// server decides the canonical `record_id`. With an empty number the
/// caller-chosen `record_id` is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordIdentity {
    /// Caller's record identity, if it already holds one.
    pub record_id: Option<RecordId>,
    /// Business key; may be empty for anonymous records.
    pub record_number: String,
    /// Display name.
    pub name: String,
    /// Contact phone.
    pub phone: Option<String>,
}

/// Resolve-or-create a canonical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveRecordRequest {
    /// Device credentials.
    pub credentials: DeviceCredentials,
    /// Identity material.
    pub identity: RecordIdentity,
}

/// The canonical record for the presented identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveRecordResponse {
    /// The canonical record. May carry a different `record_id` than the
    /// caller proposed when another device created the number first.
    pub record: Record,
}

/// Update record metadata under optimistic locking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecordRequest {
    /// Device credentials.
    pub credentials: DeviceCredentials,
    /// The record state to store.
    pub record: Record,
    /// Version the caller last saw; `None` opts into last-write-wins.
    pub expected_version: Option<Version>,
}

// ---------------------------------------------------------------------------
// Upserts
// ---------------------------------------------------------------------------

/// Upsert the note of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertNoteRequest {
    /// Device credentials.
    pub credentials: DeviceCredentials,
    /// Owning record.
    pub record_id: RecordId,
    /// Full replacement page content.
    pub pages: Vec<Page>,
    /// Version the caller last saw; `None` opts into last-write-wins.
    pub expected_version: Option<Version>,
}

/// Upsert a schedule drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertDrawingRequest {
    /// Device credentials.
    pub credentials: DeviceCredentials,
    /// Composite natural key.
    pub key: DrawingKey,
    /// Full replacement stroke content.
    pub strokes: Vec<Stroke>,
    /// Version the caller last saw; `None` opts into last-write-wins.
    pub expected_version: Option<Version>,
}

/// Upsert an event row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertEventRequest {
    /// Device credentials.
    pub credentials: DeviceCredentials,
    /// The event state to store.
    pub event: Event,
    /// Version the caller last saw; `None` opts into last-write-wins.
    pub expected_version: Option<Version>,
}

// ---------------------------------------------------------------------------
// Batch save
// ---------------------------------------------------------------------------

/// One note item inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteWrite {
    /// Owning record.
    pub record_id: RecordId,
    /// Full replacement page content.
    pub pages: Vec<Page>,
    /// Version the caller last saw.
    pub expected_version: Option<Version>,
}

/// One drawing item inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingWrite {
    /// Composite natural key.
    pub key: DrawingKey,
    /// Full replacement stroke content.
    pub strokes: Vec<Stroke>,
    /// Version the caller last saw.
    pub expected_version: Option<Version>,
}

/// Apply a mixed set of note and drawing writes atomically.
///
/// An empty batch still proves ownership of the target book; the credential
/// and ownership gates run before the item count is even looked at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSaveRequest {
    /// Device credentials.
    pub credentials: DeviceCredentials,
    /// The book every item must belong to.
    pub book_id: BookId,
    /// Note items.
    pub notes: Vec<NoteWrite>,
    /// Drawing items.
    pub drawings: Vec<DrawingWrite>,
}

impl BatchSaveRequest {
    /// Combined item count, checked against [`MAX_BATCH_ITEMS`].
    pub fn item_count(&self) -> usize {
        self.notes.len() + self.drawings.len()
    }
}

/// Identifiers written by a successful batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSaveResponse {
    /// Records whose notes were written.
    pub note_records: Vec<RecordId>,
    /// Keys of drawings written.
    pub drawing_keys: Vec<DrawingKey>,
}

/// The first failing check of a rejected batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchConflict {
    /// A note item's expected version was stale.
    Note {
        /// Owning record of the conflicting note.
        record_id: RecordId,
        /// The server's current state.
        conflict: VersionConflict<Note>,
    },
    /// A drawing item's expected version was stale.
    Drawing {
        /// Key of the conflicting drawing.
        key: DrawingKey,
        /// The server's current state.
        conflict: VersionConflict<Drawing>,
    },
}

/// Outcome of a batch save. Rejections name the check that failed; the
/// transaction is guaranteed rolled back in every non-`Saved` arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchSaveResult {
    /// Every item applied.
    Saved(BatchSaveResponse),
    /// A version check failed; no item applied.
    Conflict(BatchConflict),
    /// Credential or ownership check failed.
    Forbidden(String),
    /// The combined item count exceeded the limit.
    PayloadTooLarge {
        /// Items in the rejected request.
        items: usize,
        /// The configured limit.
        limit: usize,
    },
    /// A malformed item failed validation.
    Invalid(String),
    /// Unexpected storage failure; the transaction was rolled back.
    Internal(String),
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetch the notes of a set of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchGetNotesRequest {
    /// Records to fetch notes for. Unknown keys are silently omitted from
    /// the response; a read miss is not an error.
    pub record_ids: Vec<RecordId>,
}

/// The subset of requested notes that exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchGetNotesResponse {
    /// Notes found, in no guaranteed order.
    pub notes: Vec<Note>,
}

/// Fetch events of a book in a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsRangeRequest {
    /// Owning book.
    pub book_id: BookId,
    /// Window start, inclusive.
    pub start: DateTime<Utc>,
    /// Window end, exclusive.
    pub end: DateTime<Utc>,
}

/// Events in the requested window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsRangeResponse {
    /// Matching events, ordered by start time.
    pub events: Vec<Event>,
}

/// Fetch drawings of a book over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingsRangeRequest {
    /// Owning book.
    pub book_id: BookId,
    /// Range start, inclusive.
    pub start: NaiveDate,
    /// Range end, inclusive. Unlike the event window, both drawing bounds
    /// are inclusive; the asymmetry between the two range reads is part of
    /// the contract.
    pub end: NaiveDate,
    /// Calendar view.
    pub view_mode: ViewMode,
}

/// Drawings in the requested range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingsRangeResponse {
    /// Matching drawings, ordered by date.
    pub drawings: Vec<Drawing>,
}

// ---------------------------------------------------------------------------
// Event lifecycle
// ---------------------------------------------------------------------------

/// Create an event, transparently resolving its owning record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEventRequest {
    /// Device credentials.
    pub credentials: DeviceCredentials,
    /// Client-minted event identity.
    pub event_id: EventId,
    /// Owning book.
    pub book_id: BookId,
    /// Identity of the owning record; created if it does not exist yet.
    pub record: RecordIdentity,
    /// Display title.
    pub title: String,
    /// Category tags.
    pub event_types: BTreeSet<EventType>,
    /// Scheduled start.
    pub start_time: DateTime<Utc>,
    /// Scheduled end, if bounded.
    pub end_time: Option<DateTime<Utc>>,
}

/// The stored event together with its (possibly newly created) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEventResponse {
    /// The event as stored.
    pub event: Event,
    /// The canonical owning record.
    pub record: Record,
}

/// Reschedule an event: create a replacement and remove the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeTimeRequest {
    /// Device credentials.
    pub credentials: DeviceCredentials,
    /// The event being rescheduled.
    pub event_id: EventId,
    /// Client-minted identity for the replacement event.
    pub new_event_id: EventId,
    /// New start.
    pub new_start: DateTime<Utc>,
    /// New end, if bounded.
    pub new_end: Option<DateTime<Utc>>,
    /// Removal reason recorded on the original event.
    pub reason: Option<String>,
}

/// Both sides of a completed reschedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeTimeResponse {
    /// The original event, now removed and pointing at its replacement.
    pub removed: Event,
    /// The replacement event.
    pub replacement: Event,
}

/// Soft-remove an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveEventRequest {
    /// Device credentials.
    pub credentials: DeviceCredentials,
    /// The event to remove.
    pub event_id: EventId,
    /// Why it is being removed.
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Books
// ---------------------------------------------------------------------------

/// Create a book with a client-minted identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBookRequest {
    /// Device credentials.
    pub credentials: DeviceCredentials,
    /// Client-minted identity; validated, never regenerated.
    pub book_id: BookId,
    /// Display name.
    pub name: String,
}

/// Archive a book (soft; hides it from the default listing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveBookRequest {
    /// Device credentials.
    pub credentials: DeviceCredentials,
    /// The book to archive.
    pub book_id: BookId,
}

/// List books visible to the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListBooksRequest {
    /// Device credentials.
    pub credentials: DeviceCredentials,
    /// Whether archived books are included.
    pub include_archived: bool,
}

/// The visible books.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListBooksResponse {
    /// Books, ordered by creation time.
    pub books: Vec<casebook_model::Book>,
}

// ---------------------------------------------------------------------------
// Conflict resolution
// ---------------------------------------------------------------------------

/// Apply a binary resolution to a previously surfaced conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveConflictRequest {
    /// Device credentials.
    pub credentials: DeviceCredentials,
    /// The conflicted entity.
    pub key: EntityKey,
    /// Chosen resolution.
    pub resolution: ConflictResolution,
    /// The server version the resolution was decided against.
    pub expected_version: Version,
    /// The local state to store for `KeepMine`; ignored for `KeepServer`.
    pub payload: Option<EntityPayload>,
}

/// Outcome of a resolution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResolveConflictResponse {
    /// The resolution took effect; this is the entity to adopt locally.
    Resolved {
        /// Entity state after resolution.
        entity: EntityPayload,
        /// Version after resolution.
        version: Version,
    },
    /// The server moved again since the conflict was surfaced.
    Conflict(VersionConflict<EntityPayload>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{from_cbor, to_cbor};
    use casebook_model::DeviceId;

    fn creds() -> DeviceCredentials {
        DeviceCredentials::new(DeviceId::new(), b"token".to_vec())
    }

    #[test]
    fn batch_item_count_is_combined() {
        let req = BatchSaveRequest {
            credentials: creds(),
            book_id: BookId::new(),
            notes: vec![NoteWrite {
                record_id: RecordId::new(),
                pages: vec![],
                expected_version: None,
            }],
            drawings: vec![
                DrawingWrite {
                    key: DrawingKey::new(
                        BookId::new(),
                        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                        ViewMode::Day,
                    ),
                    strokes: vec![],
                    expected_version: None,
                };
                2
            ],
        };
        assert_eq!(req.item_count(), 3);
    }

    #[test]
    fn upsert_note_request_roundtrip() {
        let req = UpsertNoteRequest {
            credentials: creds(),
            record_id: RecordId::new(),
            pages: vec![Page::default()],
            expected_version: Some(Version::new(3)),
        };
        let back: UpsertNoteRequest = from_cbor(&to_cbor(&req).unwrap()).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn batch_result_conflict_roundtrip() {
        let record_id = RecordId::new();
        let result = BatchSaveResult::Conflict(BatchConflict::Note {
            record_id,
            conflict: VersionConflict {
                server_version: Version::new(5),
                server_entity: Note::new(record_id, vec![]),
            },
        });
        let back: BatchSaveResult = from_cbor(&to_cbor(&result).unwrap()).unwrap();
        assert_eq!(back, result);
    }
}
