//! End-to-end sync flows: two devices against one in-process server.

use casebook_model::{
    Book, BookId, DeviceId, DrawingKey, Event, EventId, Note, Page, Record, RecordId, Stroke,
    StrokePoint, Version, ViewMode,
};
use casebook_protocol::{
    BatchSaveRequest, BatchSaveResult, ChangeTimeRequest, ConflictResolution, CreateBookRequest,
    DeviceCredentials, DrawingWrite, EntityKey, EntityPayload, NoteWrite, PullRequest,
    ResolveConflictRequest, ResolveConflictResponse, ResolveRecordRequest, ResolveRecordResponse,
    UpdateRecordRequest, UpsertDrawingRequest, UpsertEventRequest, UpsertNoteRequest,
    UpsertOutcome,
};
use casebook_sync_engine::{
    LocalCache, SyncConfig, SyncCoordinator, SyncError, SyncResult, SyncTransport,
};
use casebook_sync_server::{CasebookStore, HmacTokenGate, ServerConfig, ServerResult, SyncHandler};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Arc;

const SECRET: &[u8] = b"loopback-test-secret-key-material";

/// Runs the engine directly against an in-process handler.
#[derive(Clone)]
struct Loopback {
    handler: SyncHandler,
}

fn map_err<T>(result: ServerResult<T>) -> SyncResult<T> {
    result.map_err(|err| match err.status_code() {
        403 => SyncError::Forbidden(err.to_string()),
        status => SyncError::Server {
            status,
            message: err.to_string(),
        },
    })
}

impl SyncTransport for Loopback {
    fn pull(&self, request: &PullRequest) -> SyncResult<casebook_protocol::PullResponse> {
        map_err(self.handler.pull(request))
    }

    fn resolve_record(
        &self,
        request: &ResolveRecordRequest,
    ) -> SyncResult<ResolveRecordResponse> {
        map_err(self.handler.resolve_record(request))
    }

    fn update_record(&self, request: &UpdateRecordRequest) -> SyncResult<UpsertOutcome<Record>> {
        map_err(self.handler.update_record(request))
    }

    fn upsert_event(&self, request: &UpsertEventRequest) -> SyncResult<UpsertOutcome<Event>> {
        map_err(self.handler.upsert_event(request))
    }

    fn upsert_note(&self, request: &UpsertNoteRequest) -> SyncResult<UpsertOutcome<Note>> {
        map_err(self.handler.upsert_note(request))
    }

    fn upsert_drawing(
        &self,
        request: &UpsertDrawingRequest,
    ) -> SyncResult<UpsertOutcome<casebook_model::Drawing>> {
        map_err(self.handler.upsert_drawing(request))
    }

    fn batch_save(&self, request: &BatchSaveRequest) -> SyncResult<BatchSaveResult> {
        Ok(self.handler.batch_save(request))
    }

    fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> SyncResult<ResolveConflictResponse> {
        map_err(self.handler.resolve_conflict(request))
    }

    fn is_connected(&self) -> bool {
        true
    }
}

struct Fixture {
    handler: SyncHandler,
    gate: HmacTokenGate,
    book_id: BookId,
}

impl Fixture {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let gate = HmacTokenGate::new(SECRET.to_vec());
        let handler = SyncHandler::new(
            CasebookStore::new(),
            Arc::new(gate.clone()),
            ServerConfig::default(),
        );
        let book_id = BookId::new();
        let creds = credentials(&gate);
        handler
            .create_book(&CreateBookRequest {
                credentials: creds,
                book_id,
                name: "Ward 3".into(),
            })
            .unwrap();
        Self {
            handler,
            gate,
            book_id,
        }
    }

    fn device(&self) -> SyncCoordinator<Loopback> {
        SyncCoordinator::new(
            Loopback {
                handler: self.handler.clone(),
            },
            LocalCache::new(),
            SyncConfig::new(credentials(&self.gate)).with_pull_batch_size(5),
        )
    }

    fn store(&self) -> &CasebookStore {
        self.handler.store()
    }
}

fn credentials(gate: &HmacTokenGate) -> DeviceCredentials {
    let device_id = DeviceId::new();
    DeviceCredentials::new(device_id, gate.issue(device_id))
}

fn ink(seed: f32) -> Vec<Page> {
    vec![Page::new(vec![Stroke::pen(
        0xFF00_00FF,
        2.0,
        vec![StrokePoint::new(seed, seed + 1.0)],
    )])]
}

fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

#[test]
fn fresh_device_mirrors_the_server_through_paged_pulls() {
    let fixture = Fixture::new();
    let seed = fixture.device();
    for i in 0..7 {
        let record_id = RecordId::new();
        seed.cache()
            .write_record(Record::new(record_id, format!("{i:03}"), "R", None));
        seed.cache().write_note(Note::new(record_id, ink(i as f32)));
    }
    assert!(seed.sync().unwrap().is_clean());

    let mirror = fixture.device();
    let report = mirror.sync().unwrap();
    assert_eq!(report.stats.pulled, 14);
    assert_eq!(report.stats.skipped_dirty, 0);
    assert_eq!(mirror.cache().dirty_count(), 0);
    assert_eq!(mirror.cache().cursor(), 14);
}

#[test]
fn two_devices_conflict_on_one_note_and_keep_mine_wins() {
    let fixture = Fixture::new();
    let a = fixture.device();
    let b = fixture.device();

    // Shared starting point: one record with a note.
    let record_id = RecordId::new();
    a.cache()
        .write_record(Record::new(record_id, "001", "Alice", None));
    a.cache().write_note(Note::new(record_id, ink(1.0)));
    a.sync().unwrap();
    b.sync().unwrap();
    let key = EntityKey::Note(record_id);
    assert_eq!(b.cache().server_version(&key), Some(Version::FIRST));

    // A pushes an edit; the server moves to v2.
    let mut note_a = a.cache().get_note(record_id).unwrap();
    note_a.pages = ink(10.0);
    a.cache().write_note(note_a);
    assert!(a.sync().unwrap().is_clean());

    // B edits offline, then syncs. The pull skips B's dirty row, and the
    // push is rejected with the server's v2 state.
    let mut note_b = b.cache().get_note(record_id).unwrap();
    note_b.pages = ink(20.0);
    b.cache().write_note(note_b.clone());
    let report = b.sync().unwrap();
    assert_eq!(report.stats.skipped_dirty, 1);
    assert_eq!(report.conflicts.len(), 1);
    let conflict = &report.conflicts[0];
    assert_eq!(conflict.key, key);
    assert_eq!(conflict.server_version, Version::new(2));
    assert_eq!(conflict.local, EntityPayload::Note(note_b.clone()));
    // B's edit survived the losing push.
    assert!(b.cache().is_dirty(&key));

    // B decides its pages win; the server moves to v3.
    assert!(b
        .resolve(conflict, ConflictResolution::KeepMine)
        .unwrap()
        .is_none());
    assert!(!b.cache().is_dirty(&key));
    assert_eq!(b.cache().server_version(&key), Some(Version::new(3)));

    // A converges on B's resolution through an ordinary pull.
    a.sync().unwrap();
    assert_eq!(a.cache().get_note(record_id).unwrap().pages, note_b.pages);
}

#[test]
fn concurrent_record_creates_converge_on_one_identity() {
    let fixture = Fixture::new();
    let a = fixture.device();
    let b = fixture.device();

    // Both devices create record "001" offline with different provisional
    // identities; A also writes its note, B schedules an event.
    let id_a = RecordId::new();
    a.cache().write_record(Record::new(id_a, "001", "Alice", None));
    a.cache().write_note(Note::new(id_a, ink(1.0)));

    let id_b = RecordId::new();
    b.cache().write_record(Record::new(id_b, "001", "Alice", None));
    b.cache().write_event(Event::new(
        EventId::new(),
        fixture.book_id,
        id_b,
        "Intake",
        ts(2, 9),
    ));

    assert!(a.sync().unwrap().is_clean());
    let report = b.sync().unwrap();
    assert!(report.is_clean());
    assert_eq!(report.stats.adopted_records, 1);

    // One record on the server, under A's identity; B's event follows it.
    let canonical = fixture.store().get_record(id_a).unwrap();
    assert_eq!(canonical.record_number, "001");
    assert!(fixture.store().get_record(id_b).is_none());
    let events = fixture.store().events_in_range(fixture.book_id, ts(2, 0), ts(3, 0));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].record_id, id_a);
    assert!(b.cache().get_record(id_b).is_none());
    assert_eq!(b.cache().get_event(events[0].id).unwrap().record_id, id_a);
}

#[test]
fn batch_with_one_stale_item_changes_nothing() {
    let fixture = Fixture::new();
    let device = fixture.device();

    let records: Vec<RecordId> = (0..3).map(|_| RecordId::new()).collect();
    for (i, id) in records.iter().enumerate() {
        device
            .cache()
            .write_record(Record::new(*id, format!("{i:03}"), "R", None));
    }
    device.sync().unwrap();

    // The stale drawing: server is at v2, the batch will expect v1.
    let stale_key = DrawingKey::new(fixture.book_id, date(2), ViewMode::Day);
    fixture.store().upsert_drawing(stale_key, vec![], None).unwrap();
    fixture
        .store()
        .upsert_drawing(stale_key, vec![], Some(Version::FIRST))
        .unwrap();
    let (_, log_before, _) = fixture.store().changes_since(0, u32::MAX);

    let notes: Vec<NoteWrite> = records
        .iter()
        .map(|id| NoteWrite {
            record_id: *id,
            pages: ink(1.0),
            expected_version: None,
        })
        .collect();
    let drawings = vec![
        DrawingWrite {
            key: DrawingKey::new(fixture.book_id, date(3), ViewMode::Week),
            strokes: vec![],
            expected_version: None,
        },
        DrawingWrite {
            key: stale_key,
            strokes: vec![],
            expected_version: Some(Version::FIRST),
        },
    ];

    let result = device
        .save_batch(fixture.book_id, notes.clone(), drawings)
        .unwrap();
    assert!(matches!(result, BatchSaveResult::Conflict(_)));
    // All-or-nothing: no note landed and the change log did not move.
    for id in &records {
        assert!(fixture.store().get_note(*id).is_none());
    }
    let (_, log_after, _) = fixture.store().changes_since(0, u32::MAX);
    assert_eq!(log_after, log_before);

    // Re-submitted against the current version, the whole batch lands.
    let drawings = vec![DrawingWrite {
        key: stale_key,
        strokes: vec![],
        expected_version: Some(Version::new(2)),
    }];
    let result = device.save_batch(fixture.book_id, notes, drawings).unwrap();
    match result {
        BatchSaveResult::Saved(response) => {
            assert_eq!(response.note_records.len(), 3);
            assert_eq!(response.drawing_keys, vec![stale_key]);
        }
        other => panic!("expected Saved, got {other:?}"),
    }
    // The authoritative rows arrive on the next pull. The page replays the
    // device's own earlier pushes too; all of them land on clean rows.
    let report = device.sync().unwrap();
    assert_eq!(report.stats.pulled, 9);
    assert!(!device.cache().get_note(records[0]).unwrap().is_blank());
    assert_eq!(
        device.cache().get_drawing(&stale_key).unwrap().version,
        Version::new(3)
    );
}

#[test]
fn reschedule_propagates_to_mirrors_with_linkage_intact() {
    let fixture = Fixture::new();
    let a = fixture.device();
    let b = fixture.device();

    let record_id = RecordId::new();
    a.cache()
        .write_record(Record::new(record_id, "001", "Alice", None));
    let event = Event::new(EventId::new(), fixture.book_id, record_id, "Intake", ts(2, 9));
    a.cache().write_event(event.clone());
    a.sync().unwrap();
    b.sync().unwrap();

    // A reschedules through the server endpoint.
    let new_id = EventId::new();
    fixture
        .handler
        .change_event_time(&ChangeTimeRequest {
            credentials: credentials(&fixture.gate),
            event_id: event.id,
            new_event_id: new_id,
            new_start: ts(9, 9),
            new_end: None,
            reason: Some("patient request".into()),
        })
        .unwrap();

    // B pulls both sides of the reschedule.
    b.sync().unwrap();
    let removed = b.cache().get_event(event.id).unwrap();
    assert!(removed.is_removed);
    assert_eq!(removed.new_event_id, Some(new_id));
    assert_eq!(removed.removal_reason.as_deref(), Some("patient request"));
    let replacement = b.cache().get_event(new_id).unwrap();
    assert_eq!(replacement.original_event_id, Some(event.id));
    assert_eq!(replacement.record_id, record_id);
    assert_eq!(replacement.start_time, ts(9, 9));

    // The calendar only shows the replacement.
    let visible = b.cache().events_in_range(fixture.book_id, ts(1, 0), ts(30, 0));
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, new_id);
}

#[test]
fn note_write_flips_has_note_on_mirrored_events() {
    let fixture = Fixture::new();
    let a = fixture.device();
    let b = fixture.device();

    let record_id = RecordId::new();
    a.cache()
        .write_record(Record::new(record_id, "001", "Alice", None));
    let event = Event::new(EventId::new(), fixture.book_id, record_id, "Intake", ts(2, 9));
    a.cache().write_event(event.clone());
    a.sync().unwrap();
    b.sync().unwrap();
    assert!(!b.cache().get_event(event.id).unwrap().has_note);

    a.cache().write_note(Note::new(record_id, ink(1.0)));
    a.sync().unwrap();
    b.sync().unwrap();
    assert!(b.cache().get_event(event.id).unwrap().has_note);
}

#[test]
fn forged_credentials_are_rejected() {
    let fixture = Fixture::new();
    let forged = DeviceCredentials::new(DeviceId::new(), vec![0u8; 56]);
    let device = SyncCoordinator::new(
        Loopback {
            handler: fixture.handler.clone(),
        },
        LocalCache::new(),
        SyncConfig::new(forged),
    );

    assert!(matches!(device.sync(), Err(SyncError::Forbidden(_))));
}

#[test]
fn archived_book_stays_listed_only_on_request() {
    let fixture = Fixture::new();
    let creds = credentials(&fixture.gate);
    let second = BookId::new();
    fixture
        .handler
        .create_book(&CreateBookRequest {
            credentials: creds.clone(),
            book_id: second,
            name: "Old ward".into(),
        })
        .unwrap();
    fixture
        .handler
        .archive_book(&casebook_protocol::ArchiveBookRequest {
            credentials: creds.clone(),
            book_id: second,
        })
        .unwrap();

    let visible = fixture
        .handler
        .list_books(&casebook_protocol::ListBooksRequest {
            credentials: creds.clone(),
            include_archived: false,
        })
        .unwrap();
    assert_eq!(visible.books.len(), 1);

    let all = fixture
        .handler
        .list_books(&casebook_protocol::ListBooksRequest {
            credentials: creds,
            include_archived: true,
        })
        .unwrap();
    assert_eq!(all.books.len(), 2);
    let archived: Vec<&Book> = all.books.iter().filter(|b| b.is_archived()).collect();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id, second);
}
