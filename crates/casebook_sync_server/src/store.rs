//! The versioned entity store.
//!
//! All server state lives in [`Tables`] behind a single `parking_lot` lock.
//! Every mutation appends the post-write entity to the change log under the
//! same lock, so the pull feed can never observe a half-applied write.
//!
//! Version policy, uniform across all entity kinds:
//! - A create starts at version 1.
//! - Every accepted overwrite advances the stored version by exactly 1; the
//!   version carried inside a request body is ignored, the server owns it.
//! - `expected_version: Some(v)` rejects the write with the current server
//!   state when `v` differs from the stored version.
//! - `expected_version: None` is last-write-wins.
//! - A create ignores `expected_version` entirely; there is no stored
//!   version to check against.

use crate::changes::ChangeLog;
use crate::error::{ServerError, ServerResult};
use casebook_model::{
    Book, BookId, Drawing, DrawingKey, Event, EventId, Note, Page, Record, RecordId, Stroke,
    Version, ViewMode,
};
use casebook_protocol::{ChangeRow, ChangedEntity, EntityKey, EntityPayload};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// In-memory tables plus the change log. One write lock guards them all.
#[derive(Default)]
pub(crate) struct Tables {
    pub(crate) books: HashMap<BookId, Book>,
    pub(crate) records: HashMap<RecordId, Record>,
    /// Unique index: non-empty record number of a non-deleted record.
    pub(crate) record_numbers: HashMap<String, RecordId>,
    pub(crate) events: HashMap<EventId, Event>,
    pub(crate) notes: HashMap<RecordId, Note>,
    pub(crate) drawings: BTreeMap<DrawingKey, Drawing>,
    pub(crate) changes: ChangeLog,
}

fn conflict(payload: EntityPayload) -> ServerError {
    ServerError::Conflict {
        key: payload.key(),
        server_version: payload.version(),
        server_state: Box::new(payload),
    }
}

impl Tables {
    // -- books --------------------------------------------------------------

    pub(crate) fn create_book(
        &mut self,
        book_id: BookId,
        name: &str,
        now: DateTime<Utc>,
    ) -> ServerResult<Book> {
        if name.trim().is_empty() {
            return Err(ServerError::validation("book name must not be empty"));
        }
        // Idempotent: re-creating an existing id returns the stored book.
        if let Some(existing) = self.books.get(&book_id) {
            return Ok(existing.clone());
        }
        let book = Book::new(book_id, name, now);
        self.books.insert(book_id, book.clone());
        Ok(book)
    }

    pub(crate) fn archive_book(
        &mut self,
        book_id: BookId,
        now: DateTime<Utc>,
    ) -> ServerResult<Book> {
        let book = self
            .books
            .get_mut(&book_id)
            .ok_or(ServerError::UnknownBook(book_id))?;
        if book.archived_at.is_none() {
            book.archived_at = Some(now);
            book.version = book.version.next();
        }
        Ok(book.clone())
    }

    pub(crate) fn list_books(&self, include_archived: bool) -> Vec<Book> {
        let mut books: Vec<Book> = self
            .books
            .values()
            .filter(|b| include_archived || !b.is_archived())
            .cloned()
            .collect();
        books.sort_by_key(|b| b.created_at);
        books
    }

    // -- records ------------------------------------------------------------

    /// Overwrites record metadata under the version gate.
    ///
    /// Creation is not possible here; new identities go through the record
    /// resolver so the number index stays authoritative.
    pub(crate) fn update_record(
        &mut self,
        incoming: Record,
        expected: Option<Version>,
    ) -> ServerResult<Record> {
        let stored = self
            .records
            .get(&incoming.record_id)
            .ok_or(ServerError::UnknownRecord(incoming.record_id))?
            .clone();
        if let Some(expected) = expected {
            if stored.version != expected {
                return Err(conflict(EntityPayload::Record(stored)));
            }
        }
        if incoming.record_number != stored.record_number {
            self.reindex_record_number(&stored, &incoming)?;
        }

        let updated = Record {
            version: stored.version.next(),
            is_deleted: stored.is_deleted,
            ..incoming
        };
        self.records.insert(updated.record_id, updated.clone());
        self.changes.record(ChangedEntity::Record(updated.clone()));
        Ok(updated)
    }

    fn reindex_record_number(&mut self, stored: &Record, incoming: &Record) -> ServerResult<()> {
        if !incoming.record_number.is_empty() {
            if let Some(holder) = self.record_numbers.get(&incoming.record_number) {
                if *holder != incoming.record_id {
                    return Err(ServerError::validation(format!(
                        "record number {:?} is already taken",
                        incoming.record_number
                    )));
                }
            }
        }
        if stored.has_number() {
            self.record_numbers.remove(&stored.record_number);
        }
        if !incoming.record_number.is_empty() {
            self.record_numbers
                .insert(incoming.record_number.clone(), incoming.record_id);
        }
        Ok(())
    }

    /// Soft-deletes a record and frees its number for reuse.
    ///
    /// Deleting an already-deleted record is a no-op returning the stored
    /// state; the first delete bumps the version.
    pub(crate) fn delete_record(&mut self, record_id: RecordId) -> ServerResult<Record> {
        let record = self
            .records
            .get_mut(&record_id)
            .ok_or(ServerError::UnknownRecord(record_id))?;
        if record.is_deleted {
            return Ok(record.clone());
        }
        record.is_deleted = true;
        record.version = record.version.next();
        let snapshot = record.clone();
        if snapshot.has_number() {
            self.record_numbers.remove(&snapshot.record_number);
        }
        self.changes.record(ChangedEntity::Record(snapshot.clone()));
        Ok(snapshot)
    }

    // -- notes --------------------------------------------------------------

    /// Full-replacement note upsert under the version gate.
    ///
    /// A changed blank/inked state also refreshes the `has_note` flag on the
    /// record's live events; each flipped flag is a versioned change of its
    /// own so mirrors converge through the ordinary pull path.
    pub(crate) fn upsert_note(
        &mut self,
        record_id: RecordId,
        pages: Vec<Page>,
        expected: Option<Version>,
    ) -> ServerResult<Note> {
        if !self.records.contains_key(&record_id) {
            return Err(ServerError::UnknownRecord(record_id));
        }
        let note = match self.notes.get(&record_id) {
            Some(stored) => {
                if let Some(expected) = expected {
                    if stored.version != expected {
                        return Err(conflict(EntityPayload::Note(stored.clone())));
                    }
                }
                Note {
                    record_id,
                    pages,
                    version: stored.version.next(),
                }
            }
            None => Note::new(record_id, pages),
        };
        self.notes.insert(record_id, note.clone());
        self.changes.record(ChangedEntity::Note(note.clone()));
        self.refresh_has_note(record_id);
        Ok(note)
    }

    fn refresh_has_note(&mut self, record_id: RecordId) {
        let has_note = self
            .notes
            .get(&record_id)
            .map(|n| !n.is_blank())
            .unwrap_or(false);
        let mut flipped = Vec::new();
        for event in self.events.values_mut() {
            if event.record_id == record_id && !event.is_removed && event.has_note != has_note {
                event.has_note = has_note;
                event.version = event.version.next();
                flipped.push(event.clone());
            }
        }
        for event in flipped {
            self.changes.record(ChangedEntity::Event(event));
        }
    }

    pub(crate) fn notes_for(&self, record_ids: &[RecordId]) -> Vec<Note> {
        record_ids
            .iter()
            .filter_map(|id| self.notes.get(id))
            .cloned()
            .collect()
    }

    // -- drawings -----------------------------------------------------------

    pub(crate) fn upsert_drawing(
        &mut self,
        key: DrawingKey,
        strokes: Vec<Stroke>,
        expected: Option<Version>,
    ) -> ServerResult<Drawing> {
        if !self.books.contains_key(&key.book_id) {
            return Err(ServerError::UnknownBook(key.book_id));
        }
        let drawing = match self.drawings.get(&key) {
            Some(stored) => {
                if let Some(expected) = expected {
                    if stored.version != expected {
                        return Err(conflict(EntityPayload::Drawing(stored.clone())));
                    }
                }
                Drawing {
                    key,
                    strokes,
                    version: stored.version.next(),
                }
            }
            None => Drawing::new(key, strokes),
        };
        self.drawings.insert(key, drawing.clone());
        self.changes.record(ChangedEntity::Drawing(drawing.clone()));
        Ok(drawing)
    }

    /// Drawings of a book over `[start, end]`, both bounds inclusive,
    /// ordered by date.
    pub(crate) fn drawings_in_range(
        &self,
        book_id: BookId,
        start: NaiveDate,
        end: NaiveDate,
        view_mode: ViewMode,
    ) -> Vec<Drawing> {
        let mut drawings: Vec<Drawing> = self
            .drawings
            .values()
            .filter(|d| {
                d.key.book_id == book_id
                    && d.key.view_mode == view_mode
                    && d.key.date >= start
                    && d.key.date <= end
            })
            .cloned()
            .collect();
        drawings.sort_by_key(|d| d.key.date);
        drawings
    }

    // -- events -------------------------------------------------------------

    /// Full-replacement event upsert under the version gate.
    ///
    /// `has_note` is a server-owned projection and is recomputed here
    /// regardless of what the request body carried.
    pub(crate) fn upsert_event(
        &mut self,
        incoming: Event,
        expected: Option<Version>,
    ) -> ServerResult<Event> {
        if !self.books.contains_key(&incoming.book_id) {
            return Err(ServerError::UnknownBook(incoming.book_id));
        }
        if !self.records.contains_key(&incoming.record_id) {
            return Err(ServerError::UnknownRecord(incoming.record_id));
        }
        let has_note = self
            .notes
            .get(&incoming.record_id)
            .map(|n| !n.is_blank())
            .unwrap_or(false);
        let event = match self.events.get(&incoming.id) {
            Some(stored) => {
                if let Some(expected) = expected {
                    if stored.version != expected {
                        return Err(conflict(EntityPayload::Event(stored.clone())));
                    }
                }
                Event {
                    has_note,
                    version: stored.version.next(),
                    ..incoming
                }
            }
            None => Event {
                has_note,
                version: Version::FIRST,
                ..incoming
            },
        };
        self.events.insert(event.id, event.clone());
        self.changes.record(ChangedEntity::Event(event.clone()));
        Ok(event)
    }

    /// Soft-removes an event. Idempotent: removing a removed event returns
    /// the stored state without a version bump.
    pub(crate) fn remove_event(
        &mut self,
        event_id: EventId,
        reason: Option<String>,
    ) -> ServerResult<Event> {
        let event = self
            .events
            .get_mut(&event_id)
            .ok_or(ServerError::UnknownEvent(event_id))?;
        if event.is_removed {
            return Ok(event.clone());
        }
        event.is_removed = true;
        event.removal_reason = reason;
        event.version = event.version.next();
        let snapshot = event.clone();
        self.changes.record(ChangedEntity::Event(snapshot.clone()));
        Ok(snapshot)
    }

    /// Reschedules an event: a replacement is created and the original is
    /// removed, each pointing at the other.
    ///
    /// Both writes land in the change log back to back, so a mirror never
    /// observes the removal without its replacement in the same pull page
    /// boundary semantics as any other pair of consecutive rows.
    pub(crate) fn change_event_time(
        &mut self,
        event_id: EventId,
        new_event_id: EventId,
        new_start: DateTime<Utc>,
        new_end: Option<DateTime<Utc>>,
        reason: Option<String>,
    ) -> ServerResult<(Event, Event)> {
        if self.events.contains_key(&new_event_id) {
            return Err(ServerError::validation(format!(
                "replacement event id {new_event_id} is already in use"
            )));
        }
        let original = self
            .events
            .get(&event_id)
            .ok_or(ServerError::UnknownEvent(event_id))?;
        if original.is_removed {
            return Err(ServerError::validation(format!(
                "event {event_id} is already removed and cannot be rescheduled"
            )));
        }

        let replacement = original.rescheduled_to(new_event_id, new_start, new_end);

        let original = self
            .events
            .get_mut(&event_id)
            .ok_or(ServerError::UnknownEvent(event_id))?;
        original.is_removed = true;
        original.removal_reason = reason;
        original.new_event_id = Some(new_event_id);
        original.version = original.version.next();
        let removed = original.clone();

        self.events.insert(new_event_id, replacement.clone());
        self.changes.record(ChangedEntity::Event(removed.clone()));
        self.changes
            .record(ChangedEntity::Event(replacement.clone()));
        Ok((removed, replacement))
    }

    /// Live events of a book within `[start, end)`, ordered by start time.
    /// Removed events are excluded; they remain reachable by id.
    pub(crate) fn events_in_range(
        &self,
        book_id: BookId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .events
            .values()
            .filter(|e| {
                e.book_id == book_id && !e.is_removed && e.start_time >= start && e.start_time < end
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start_time);
        events
    }

    // -- generic ------------------------------------------------------------

    /// Current state of any entity by natural key.
    pub(crate) fn current_state(&self, key: &EntityKey) -> Option<EntityPayload> {
        match key {
            EntityKey::Record(id) => self.records.get(id).cloned().map(EntityPayload::Record),
            EntityKey::Event(id) => self.events.get(id).cloned().map(EntityPayload::Event),
            EntityKey::Note(id) => self.notes.get(id).cloned().map(EntityPayload::Note),
            EntityKey::Drawing(key) => self.drawings.get(key).cloned().map(EntityPayload::Drawing),
        }
    }

    /// Applies a full entity body under the version gate, routing by kind.
    pub(crate) fn apply_payload(
        &mut self,
        payload: EntityPayload,
        expected: Option<Version>,
    ) -> ServerResult<EntityPayload> {
        match payload {
            EntityPayload::Record(r) => self
                .update_record(r, expected)
                .map(EntityPayload::Record),
            EntityPayload::Event(e) => self.upsert_event(e, expected).map(EntityPayload::Event),
            EntityPayload::Note(n) => self
                .upsert_note(n.record_id, n.pages, expected)
                .map(EntityPayload::Note),
            EntityPayload::Drawing(d) => self
                .upsert_drawing(d.key, d.strokes, expected)
                .map(EntityPayload::Drawing),
        }
    }

    pub(crate) fn changes_since(&self, cursor: u64, limit: u32) -> (Vec<ChangeRow>, u64, bool) {
        let rows = self.changes.since(cursor, limit);
        let new_cursor = rows.last().map(|r| r.sequence).unwrap_or(cursor);
        let has_more = self.changes.has_more_after(cursor, limit);
        (rows, new_cursor, has_more)
    }
}

/// Handle to the shared server tables.
///
/// Cloning is cheap; all clones address the same state.
#[derive(Clone, Default)]
pub struct CasebookStore {
    inner: Arc<RwLock<Tables>>,
}

impl CasebookStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.inner.write()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.inner.read()
    }

    /// Creates a book, idempotently for an already-known id.
    pub fn create_book(&self, book_id: BookId, name: &str) -> ServerResult<Book> {
        self.write().create_book(book_id, name, Utc::now())
    }

    /// Archives a book. Already-archived books are returned unchanged.
    pub fn archive_book(&self, book_id: BookId) -> ServerResult<Book> {
        self.write().archive_book(book_id, Utc::now())
    }

    /// Lists books ordered by creation time.
    pub fn list_books(&self, include_archived: bool) -> Vec<Book> {
        self.read().list_books(include_archived)
    }

    /// Overwrites record metadata under the version gate.
    pub fn update_record(&self, record: Record, expected: Option<Version>) -> ServerResult<Record> {
        self.write().update_record(record, expected)
    }

    /// Soft-deletes a record.
    pub fn delete_record(&self, record_id: RecordId) -> ServerResult<Record> {
        self.write().delete_record(record_id)
    }

    /// Upserts the note of a record under the version gate.
    pub fn upsert_note(
        &self,
        record_id: RecordId,
        pages: Vec<Page>,
        expected: Option<Version>,
    ) -> ServerResult<Note> {
        self.write().upsert_note(record_id, pages, expected)
    }

    /// Upserts a schedule drawing under the version gate.
    pub fn upsert_drawing(
        &self,
        key: DrawingKey,
        strokes: Vec<Stroke>,
        expected: Option<Version>,
    ) -> ServerResult<Drawing> {
        self.write().upsert_drawing(key, strokes, expected)
    }

    /// Upserts an event under the version gate.
    pub fn upsert_event(&self, event: Event, expected: Option<Version>) -> ServerResult<Event> {
        self.write().upsert_event(event, expected)
    }

    /// Soft-removes an event.
    pub fn remove_event(&self, event_id: EventId, reason: Option<String>) -> ServerResult<Event> {
        self.write().remove_event(event_id, reason)
    }

    /// Reschedules an event; returns `(removed original, replacement)`.
    pub fn change_event_time(
        &self,
        event_id: EventId,
        new_event_id: EventId,
        new_start: DateTime<Utc>,
        new_end: Option<DateTime<Utc>>,
        reason: Option<String>,
    ) -> ServerResult<(Event, Event)> {
        self.write()
            .change_event_time(event_id, new_event_id, new_start, new_end, reason)
    }

    /// Point lookup of a book.
    pub fn get_book(&self, book_id: BookId) -> Option<Book> {
        self.read().books.get(&book_id).cloned()
    }

    /// Point lookup of a record.
    pub fn get_record(&self, record_id: RecordId) -> Option<Record> {
        self.read().records.get(&record_id).cloned()
    }

    /// Point lookup of an event.
    pub fn get_event(&self, event_id: EventId) -> Option<Event> {
        self.read().events.get(&event_id).cloned()
    }

    /// Point lookup of a note.
    pub fn get_note(&self, record_id: RecordId) -> Option<Note> {
        self.read().notes.get(&record_id).cloned()
    }

    /// Point lookup of a drawing.
    pub fn get_drawing(&self, key: &DrawingKey) -> Option<Drawing> {
        self.read().drawings.get(key).cloned()
    }

    /// Notes of the given records; unknown ids are omitted.
    pub fn notes_for(&self, record_ids: &[RecordId]) -> Vec<Note> {
        self.read().notes_for(record_ids)
    }

    /// Live events of a book within `[start, end)`.
    pub fn events_in_range(
        &self,
        book_id: BookId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Event> {
        self.read().events_in_range(book_id, start, end)
    }

    /// Drawings of a book within `[start, end]`.
    pub fn drawings_in_range(
        &self,
        book_id: BookId,
        start: NaiveDate,
        end: NaiveDate,
        view_mode: ViewMode,
    ) -> Vec<Drawing> {
        self.read().drawings_in_range(book_id, start, end, view_mode)
    }

    /// A page of the change log after `cursor`: `(rows, new_cursor, has_more)`.
    pub fn changes_since(&self, cursor: u64, limit: u32) -> (Vec<ChangeRow>, u64, bool) {
        self.read().changes_since(cursor, limit)
    }

    /// Current state of any entity by natural key.
    pub fn current_state(&self, key: &EntityKey) -> Option<EntityPayload> {
        self.read().current_state(key)
    }
}
