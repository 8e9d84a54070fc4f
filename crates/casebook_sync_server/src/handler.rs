//! Request handlers.
//!
//! One handler instance serves every endpoint of the sync surface. Write
//! endpoints authorize the device through the credential gate first; read
//! endpoints carry no credentials and are expected to sit behind transport
//! auth in a real deployment.

use crate::auth::CredentialGate;
use crate::batch::BatchEngine;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::identity::{resolve_in, RecordResolver};
use crate::store::CasebookStore;
use casebook_model::{Drawing, Event, Note, Record, Version};
use casebook_protocol::{
    ArchiveBookRequest, BatchGetNotesRequest, BatchGetNotesResponse, BatchSaveRequest,
    BatchSaveResult, ChangeTimeRequest, ChangeTimeResponse, ConflictResolution, CreateBookRequest,
    CreateEventRequest, CreateEventResponse, DeviceCredentials, DrawingsRangeRequest,
    DrawingsRangeResponse, EntityPayload, EventsRangeRequest, EventsRangeResponse,
    ListBooksRequest, ListBooksResponse, PullRequest, PullResponse, RemoveEventRequest,
    ResolveConflictRequest, ResolveConflictResponse, ResolveRecordRequest, ResolveRecordResponse,
    UpdateRecordRequest, UpsertDrawingRequest, UpsertEventRequest, UpsertNoteRequest,
    UpsertOutcome, VersionConflict,
};
use std::sync::Arc;
use tracing::{debug, info};

/// The server-side endpoint surface.
#[derive(Clone)]
pub struct SyncHandler {
    store: CasebookStore,
    resolver: RecordResolver,
    batch: BatchEngine,
    gate: Arc<dyn CredentialGate>,
    config: ServerConfig,
}

impl SyncHandler {
    /// Creates a handler over a store, behind a credential gate.
    pub fn new(store: CasebookStore, gate: Arc<dyn CredentialGate>, config: ServerConfig) -> Self {
        Self {
            resolver: RecordResolver::new(store.clone()),
            batch: BatchEngine::new(store.clone(), config.clone()),
            store,
            gate,
            config,
        }
    }

    /// The store this handler serves. Useful for seeding in tests.
    pub fn store(&self) -> &CasebookStore {
        &self.store
    }

    fn authorize(&self, credentials: &DeviceCredentials) -> ServerResult<()> {
        if self.gate.check(credentials) {
            Ok(())
        } else {
            Err(ServerError::forbidden(format!(
                "device {} failed the credential check",
                credentials.device_id
            )))
        }
    }

    // -- pull ---------------------------------------------------------------

    /// Serves a page of the change log after the client's cursor.
    pub fn pull(&self, request: &PullRequest) -> ServerResult<PullResponse> {
        self.authorize(&request.credentials)?;
        let limit = request.limit.min(self.config.max_pull_batch);
        let (rows, new_cursor, has_more) = self.store.changes_since(request.cursor, limit);
        debug!(
            device = %request.credentials.device_id,
            cursor = request.cursor,
            rows = rows.len(),
            has_more,
            "pull served"
        );
        Ok(PullResponse {
            rows,
            new_cursor,
            has_more,
        })
    }

    // -- records ------------------------------------------------------------

    /// Resolves identity material to the canonical record.
    pub fn resolve_record(
        &self,
        request: &ResolveRecordRequest,
    ) -> ServerResult<ResolveRecordResponse> {
        self.authorize(&request.credentials)?;
        let record = self.resolver.resolve(&request.identity)?;
        Ok(ResolveRecordResponse { record })
    }

    /// Overwrites record metadata under the version gate.
    pub fn update_record(
        &self,
        request: &UpdateRecordRequest,
    ) -> ServerResult<UpsertOutcome<Record>> {
        self.authorize(&request.credentials)?;
        as_outcome(
            self.store
                .update_record(request.record.clone(), request.expected_version),
            |r: &Record| r.version,
            |p| match p {
                EntityPayload::Record(r) => Some(r),
                _ => None,
            },
        )
    }

    // -- upserts ------------------------------------------------------------

    /// Upserts the note of a record.
    pub fn upsert_note(&self, request: &UpsertNoteRequest) -> ServerResult<UpsertOutcome<Note>> {
        self.authorize(&request.credentials)?;
        as_outcome(
            self.store.upsert_note(
                request.record_id,
                request.pages.clone(),
                request.expected_version,
            ),
            |n: &Note| n.version,
            |p| match p {
                EntityPayload::Note(n) => Some(n),
                _ => None,
            },
        )
    }

    /// Upserts a schedule drawing.
    pub fn upsert_drawing(
        &self,
        request: &UpsertDrawingRequest,
    ) -> ServerResult<UpsertOutcome<Drawing>> {
        self.authorize(&request.credentials)?;
        as_outcome(
            self.store.upsert_drawing(
                request.key,
                request.strokes.clone(),
                request.expected_version,
            ),
            |d: &Drawing| d.version,
            |p| match p {
                EntityPayload::Drawing(d) => Some(d),
                _ => None,
            },
        )
    }

    /// Upserts an event row.
    pub fn upsert_event(&self, request: &UpsertEventRequest) -> ServerResult<UpsertOutcome<Event>> {
        self.authorize(&request.credentials)?;
        as_outcome(
            self.store
                .upsert_event(request.event.clone(), request.expected_version),
            |e: &Event| e.version,
            |p| match p {
                EntityPayload::Event(e) => Some(e),
                _ => None,
            },
        )
    }

    // -- batches ------------------------------------------------------------

    /// Applies a batch atomically. Credential failures surface as the
    /// `Forbidden` arm rather than an error, matching the wire shape.
    pub fn batch_save(&self, request: &BatchSaveRequest) -> BatchSaveResult {
        if let Err(err) = self.authorize(&request.credentials) {
            return BatchSaveResult::Forbidden(err.to_string());
        }
        self.batch.save(request)
    }

    /// Fetches the notes of a set of records; unknown ids are omitted.
    pub fn batch_get_notes(&self, request: &BatchGetNotesRequest) -> BatchGetNotesResponse {
        BatchGetNotesResponse {
            notes: self.store.notes_for(&request.record_ids),
        }
    }

    // -- reads --------------------------------------------------------------

    /// Live events of a book within `[start, end)`.
    pub fn events_in_range(&self, request: &EventsRangeRequest) -> EventsRangeResponse {
        EventsRangeResponse {
            events: self
                .store
                .events_in_range(request.book_id, request.start, request.end),
        }
    }

    /// Drawings of a book within `[start, end]`.
    pub fn drawings_in_range(&self, request: &DrawingsRangeRequest) -> DrawingsRangeResponse {
        DrawingsRangeResponse {
            drawings: self.store.drawings_in_range(
                request.book_id,
                request.start,
                request.end,
                request.view_mode,
            ),
        }
    }

    // -- event lifecycle ----------------------------------------------------

    /// Creates an event, resolving its owning record under the same lock as
    /// the event write so the record cannot be claimed in between.
    pub fn create_event(&self, request: &CreateEventRequest) -> ServerResult<CreateEventResponse> {
        self.authorize(&request.credentials)?;
        let mut tables = self.store.write();
        let record = resolve_in(&mut tables, &request.record)?;

        let mut event = Event::new(
            request.event_id,
            request.book_id,
            record.record_id,
            request.title.clone(),
            request.start_time,
        );
        event.event_types = request.event_types.clone();
        event.end_time = request.end_time;
        let event = tables.upsert_event(event, None)?;
        Ok(CreateEventResponse { event, record })
    }

    /// Reschedules an event to a new time.
    pub fn change_event_time(&self, request: &ChangeTimeRequest) -> ServerResult<ChangeTimeResponse> {
        self.authorize(&request.credentials)?;
        let (removed, replacement) = self.store.change_event_time(
            request.event_id,
            request.new_event_id,
            request.new_start,
            request.new_end,
            request.reason.clone(),
        )?;
        Ok(ChangeTimeResponse {
            removed,
            replacement,
        })
    }

    /// Soft-removes an event.
    pub fn remove_event(&self, request: &RemoveEventRequest) -> ServerResult<Event> {
        self.authorize(&request.credentials)?;
        self.store
            .remove_event(request.event_id, request.reason.clone())
    }

    // -- books --------------------------------------------------------------

    /// Creates a book with the client-minted id.
    pub fn create_book(&self, request: &CreateBookRequest) -> ServerResult<casebook_model::Book> {
        self.authorize(&request.credentials)?;
        let book = self.store.create_book(request.book_id, &request.name)?;
        info!(book = %book.id, name = %book.name, "book created");
        Ok(book)
    }

    /// Archives a book.
    pub fn archive_book(&self, request: &ArchiveBookRequest) -> ServerResult<casebook_model::Book> {
        self.authorize(&request.credentials)?;
        self.store.archive_book(request.book_id)
    }

    /// Lists visible books.
    pub fn list_books(&self, request: &ListBooksRequest) -> ServerResult<ListBooksResponse> {
        self.authorize(&request.credentials)?;
        Ok(ListBooksResponse {
            books: self.store.list_books(request.include_archived),
        })
    }

    // -- conflict resolution ------------------------------------------------

    /// Applies a binary resolution to a previously surfaced conflict.
    ///
    /// The decision is re-validated against the current server version; if
    /// the server moved again since the conflict was surfaced, the caller
    /// gets a fresh conflict instead of a silent overwrite.
    pub fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> ServerResult<ResolveConflictResponse> {
        self.authorize(&request.credentials)?;
        let mut tables = self.store.write();
        let current = tables.current_state(&request.key).ok_or_else(|| {
            ServerError::validation(format!("no entity at {} to resolve", request.key))
        })?;
        if current.version() != request.expected_version {
            return Ok(ResolveConflictResponse::Conflict(VersionConflict {
                server_version: current.version(),
                server_entity: current,
            }));
        }

        match request.resolution {
            ConflictResolution::KeepServer => Ok(ResolveConflictResponse::Resolved {
                version: current.version(),
                entity: current,
            }),
            ConflictResolution::KeepMine => {
                let payload = request.payload.clone().ok_or_else(|| {
                    ServerError::validation("keep_mine resolution requires a payload")
                })?;
                if payload.key() != request.key {
                    return Err(ServerError::validation(format!(
                        "resolution payload addresses {} but the request names {}",
                        payload.key(),
                        request.key
                    )));
                }
                let entity = tables.apply_payload(payload, Some(request.expected_version))?;
                Ok(ResolveConflictResponse::Resolved {
                    version: entity.version(),
                    entity,
                })
            }
        }
    }
}

/// Folds a store result into the wire outcome: version conflicts become the
/// `Conflict` arm, every other error stays an error.
fn as_outcome<T>(
    result: ServerResult<T>,
    version_of: fn(&T) -> Version,
    from_payload: fn(EntityPayload) -> Option<T>,
) -> ServerResult<UpsertOutcome<T>> {
    match result {
        Ok(entity) => {
            let new_version = version_of(&entity);
            Ok(UpsertOutcome::Applied {
                entity,
                new_version,
            })
        }
        Err(ServerError::Conflict {
            server_version,
            server_state,
            key,
        }) => match from_payload(*server_state) {
            Some(server_entity) => Ok(UpsertOutcome::Conflict(VersionConflict {
                server_version,
                server_entity,
            })),
            None => Err(ServerError::Internal(format!(
                "conflict state for {key} carried the wrong entity kind"
            ))),
        },
        Err(other) => Err(other),
    }
}
