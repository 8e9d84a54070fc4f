//! Transport seam between the coordinator and the server.
//!
//! The coordinator only ever talks through [`SyncTransport`], so tests can
//! substitute a scripted mock or a loopback onto an in-process server, and
//! deployments can plug in whatever carrier they run (see the HTTP binding
//! in [`crate::http`]).

use crate::error::{SyncError, SyncResult};
use casebook_model::{Drawing, Event, Note, Record, RecordId, Version};
use casebook_protocol::{
    BatchSaveRequest, BatchSaveResult, EntityPayload, PullRequest, PullResponse,
    ResolveConflictRequest, ResolveConflictResponse, ResolveRecordRequest, ResolveRecordResponse,
    UpdateRecordRequest, UpsertDrawingRequest, UpsertEventRequest, UpsertNoteRequest,
    UpsertOutcome,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// The operations the sync protocol needs from a carrier.
pub trait SyncTransport: Send + Sync {
    /// Fetches a page of server changes after the cursor.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Resolves identity material to the canonical record.
    fn resolve_record(&self, request: &ResolveRecordRequest) -> SyncResult<ResolveRecordResponse>;

    /// Pushes record metadata under the version gate.
    fn update_record(&self, request: &UpdateRecordRequest) -> SyncResult<UpsertOutcome<Record>>;

    /// Pushes an event under the version gate.
    fn upsert_event(&self, request: &UpsertEventRequest) -> SyncResult<UpsertOutcome<Event>>;

    /// Pushes a note under the version gate.
    fn upsert_note(&self, request: &UpsertNoteRequest) -> SyncResult<UpsertOutcome<Note>>;

    /// Pushes a drawing under the version gate.
    fn upsert_drawing(&self, request: &UpsertDrawingRequest)
        -> SyncResult<UpsertOutcome<Drawing>>;

    /// Applies a batch atomically.
    fn batch_save(&self, request: &BatchSaveRequest) -> SyncResult<BatchSaveResult>;

    /// Applies a resolution to a surfaced conflict.
    fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> SyncResult<ResolveConflictResponse>;

    /// Whether the carrier currently believes it can reach the server.
    fn is_connected(&self) -> bool;
}

#[derive(Default)]
struct MockState {
    connected: bool,
    failures: VecDeque<SyncError>,
    pull_pages: VecDeque<PullResponse>,
    canonical_records: HashMap<String, Record>,
    calls: Vec<&'static str>,
}

/// Scripted in-memory transport for unit tests.
///
/// Upserts auto-acknowledge: the pushed entity comes back `Applied` with
/// the version advanced past the expected one. Pull pages and failures are
/// scripted; a canonical record can be planted per record number to
/// exercise identity adoption.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    /// Creates a connected mock with no scripted behavior.
    pub fn new() -> Self {
        let mock = Self::default();
        mock.state.lock().connected = true;
        mock
    }

    /// Queues an error; the next call consumes it.
    pub fn fail_next(&self, error: SyncError) {
        self.state.lock().failures.push_back(error);
    }

    /// Queues a pull page. Unqueued pulls return an empty final page.
    pub fn push_pull_page(&self, page: PullResponse) {
        self.state.lock().pull_pages.push_back(page);
    }

    /// Plants the canonical record returned for a record number, whatever
    /// identity a resolve proposes.
    pub fn plant_canonical_record(&self, record: Record) {
        self.state
            .lock()
            .canonical_records
            .insert(record.record_number.clone(), record);
    }

    /// Sets connectivity reported by `is_connected`.
    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Method names invoked so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    fn enter(&self, call: &'static str) -> SyncResult<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn ack_version(expected: Option<Version>) -> Version {
        expected.map(|v| v.next()).unwrap_or(Version::FIRST)
    }
}

impl SyncTransport for MockTransport {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.enter("pull")?;
        Ok(self
            .state
            .lock()
            .pull_pages
            .pop_front()
            .unwrap_or(PullResponse {
                rows: Vec::new(),
                new_cursor: request.cursor,
                has_more: false,
            }))
    }

    fn resolve_record(&self, request: &ResolveRecordRequest) -> SyncResult<ResolveRecordResponse> {
        self.enter("resolve_record")?;
        let state = self.state.lock();
        let record = state
            .canonical_records
            .get(&request.identity.record_number)
            .cloned()
            .unwrap_or_else(|| {
                Record::new(
                    request.identity.record_id.unwrap_or_else(RecordId::new),
                    request.identity.record_number.clone(),
                    request.identity.name.clone(),
                    request.identity.phone.clone(),
                )
            });
        Ok(ResolveRecordResponse { record })
    }

    fn update_record(&self, request: &UpdateRecordRequest) -> SyncResult<UpsertOutcome<Record>> {
        self.enter("update_record")?;
        let mut record = request.record.clone();
        record.version = Self::ack_version(request.expected_version);
        Ok(UpsertOutcome::Applied {
            new_version: record.version,
            entity: record,
        })
    }

    fn upsert_event(&self, request: &UpsertEventRequest) -> SyncResult<UpsertOutcome<Event>> {
        self.enter("upsert_event")?;
        let mut event = request.event.clone();
        event.version = Self::ack_version(request.expected_version);
        Ok(UpsertOutcome::Applied {
            new_version: event.version,
            entity: event,
        })
    }

    fn upsert_note(&self, request: &UpsertNoteRequest) -> SyncResult<UpsertOutcome<Note>> {
        self.enter("upsert_note")?;
        let version = Self::ack_version(request.expected_version);
        Ok(UpsertOutcome::Applied {
            entity: Note {
                record_id: request.record_id,
                pages: request.pages.clone(),
                version,
            },
            new_version: version,
        })
    }

    fn upsert_drawing(
        &self,
        request: &UpsertDrawingRequest,
    ) -> SyncResult<UpsertOutcome<Drawing>> {
        self.enter("upsert_drawing")?;
        let version = Self::ack_version(request.expected_version);
        Ok(UpsertOutcome::Applied {
            entity: Drawing {
                key: request.key,
                strokes: request.strokes.clone(),
                version,
            },
            new_version: version,
        })
    }

    fn batch_save(&self, request: &BatchSaveRequest) -> SyncResult<BatchSaveResult> {
        self.enter("batch_save")?;
        Ok(BatchSaveResult::Saved(casebook_protocol::BatchSaveResponse {
            note_records: request.notes.iter().map(|n| n.record_id).collect(),
            drawing_keys: request.drawings.iter().map(|d| d.key).collect(),
        }))
    }

    fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> SyncResult<ResolveConflictResponse> {
        self.enter("resolve_conflict")?;
        match &request.payload {
            Some(payload) => {
                let version = request.expected_version.next();
                Ok(ResolveConflictResponse::Resolved {
                    entity: with_version(payload.clone(), version),
                    version,
                })
            }
            None => Err(SyncError::transport(
                "mock resolve_conflict needs a payload to echo",
            )),
        }
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}

fn with_version(mut payload: EntityPayload, version: Version) -> EntityPayload {
    match &mut payload {
        EntityPayload::Record(r) => r.version = version,
        EntityPayload::Event(e) => e.version = version,
        EntityPayload::Note(n) => n.version = version,
        EntityPayload::Drawing(d) => d.version = version,
    }
    payload
}
