//! # Casebook Sync Protocol
//!
//! Wire contract between the client-side sync engine and the sync server.
//!
//! This crate provides:
//! - Request/response types for every sync endpoint
//! - The version-conflict payload (always carries the server's current state)
//! - Change-feed rows used by pull
//! - Device credentials and CBOR encode/decode helpers
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changes;
mod conflict;
mod credentials;
mod messages;
mod wire;

pub use changes::{ChangeRow, ChangedEntity, PullRequest, PullResponse};
pub use conflict::{ConflictResolution, EntityKey, EntityPayload, UpsertOutcome, VersionConflict};
pub use credentials::DeviceCredentials;
pub use messages::{
    ArchiveBookRequest, BatchConflict, BatchGetNotesRequest, BatchGetNotesResponse,
    BatchSaveRequest, BatchSaveResponse, BatchSaveResult, ChangeTimeRequest, ChangeTimeResponse,
    CreateBookRequest, CreateEventRequest, CreateEventResponse, DrawingWrite, DrawingsRangeRequest,
    DrawingsRangeResponse, EventsRangeRequest, EventsRangeResponse, ListBooksRequest,
    ListBooksResponse, NoteWrite, RecordIdentity, RemoveEventRequest, ResolveConflictRequest,
    ResolveConflictResponse, ResolveRecordRequest, ResolveRecordResponse, UpdateRecordRequest,
    UpsertDrawingRequest, UpsertEventRequest, UpsertNoteRequest, MAX_BATCH_ITEMS,
};
pub use wire::{from_cbor, to_cbor, ProtocolError, ProtocolResult};
