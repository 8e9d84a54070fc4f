//! The local offline cache.
//!
//! The cache mirrors server state row by row and layers local edits on top.
//! Each row remembers the last server version it was confirmed at and
//! whether a local edit is waiting to be pushed. Pulled changes overwrite
//! clean rows unconditionally; a dirty row is never overwritten by pull, so
//! the stale confirmed version survives until push surfaces the conflict.

use crate::error::SyncResult;
use casebook_model::{
    BookId, Drawing, DrawingKey, Event, EventId, Note, Record, RecordId, Version,
};
use casebook_protocol::{from_cbor, to_cbor, ChangedEntity, EntityKey, EntityPayload};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// One cached entity plus its sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRow<T> {
    /// Current local state.
    pub entity: T,
    /// Server version this row was last confirmed at; `None` until the
    /// entity has been seen by the server at all.
    pub server_version: Option<Version>,
    /// Whether a local edit is waiting to be pushed.
    pub dirty: bool,
}

impl<T> CachedRow<T> {
    fn confirmed(entity: T, version: Version) -> Self {
        Self {
            entity,
            server_version: Some(version),
            dirty: false,
        }
    }
}

/// A dirty row in push form: the full payload plus the version gate to
/// present. `expected: None` means the entity was never confirmed and the
/// push is a create.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    /// Full local state.
    pub payload: EntityPayload,
    /// Version gate for the push.
    pub expected: Option<Version>,
}

#[derive(Default, Clone, Serialize, Deserialize)]
struct CacheInner {
    records: HashMap<RecordId, CachedRow<Record>>,
    events: HashMap<EventId, CachedRow<Event>>,
    notes: HashMap<RecordId, CachedRow<Note>>,
    drawings: BTreeMap<DrawingKey, CachedRow<Drawing>>,
    cursor: u64,
}

/// Thread-safe local cache. Clones share state.
#[derive(Clone, Default)]
pub struct LocalCache {
    inner: Arc<RwLock<CacheInner>>,
}

impl LocalCache {
    /// Creates an empty cache at cursor 0.
    pub fn new() -> Self {
        Self::default()
    }

    // -- cursor -------------------------------------------------------------

    /// Highest server change-log sequence already applied.
    pub fn cursor(&self) -> u64 {
        self.inner.read().cursor
    }

    /// Advances the pull cursor.
    pub fn set_cursor(&self, cursor: u64) {
        self.inner.write().cursor = cursor;
    }

    // -- local edits --------------------------------------------------------

    /// Stores a local record edit, marking the row dirty.
    pub fn write_record(&self, record: Record) {
        let mut inner = self.inner.write();
        let server_version = inner
            .records
            .get(&record.record_id)
            .and_then(|row| row.server_version);
        inner.records.insert(
            record.record_id,
            CachedRow {
                entity: record,
                server_version,
                dirty: true,
            },
        );
    }

    /// Stores a local event edit, marking the row dirty.
    pub fn write_event(&self, event: Event) {
        let mut inner = self.inner.write();
        let server_version = inner.events.get(&event.id).and_then(|row| row.server_version);
        inner.events.insert(
            event.id,
            CachedRow {
                entity: event,
                server_version,
                dirty: true,
            },
        );
    }

    /// Stores a local note edit, marking the row dirty.
    pub fn write_note(&self, note: Note) {
        let mut inner = self.inner.write();
        let server_version = inner
            .notes
            .get(&note.record_id)
            .and_then(|row| row.server_version);
        inner.notes.insert(
            note.record_id,
            CachedRow {
                entity: note,
                server_version,
                dirty: true,
            },
        );
    }

    /// Stores a local drawing edit, marking the row dirty.
    pub fn write_drawing(&self, drawing: Drawing) {
        let mut inner = self.inner.write();
        let server_version = inner.drawings.get(&drawing.key).and_then(|row| row.server_version);
        inner.drawings.insert(
            drawing.key,
            CachedRow {
                entity: drawing,
                server_version,
                dirty: true,
            },
        );
    }

    // -- pull side ----------------------------------------------------------

    /// Applies one pulled change. Clean rows are overwritten without any
    /// version comparison; a dirty row is left untouched so the local edit
    /// survives until push decides the conflict. Returns whether the row
    /// was applied.
    pub fn apply_server_change(&self, change: &ChangedEntity) -> bool {
        let mut inner = self.inner.write();
        match change {
            ChangedEntity::Record(record) => {
                if inner.records.get(&record.record_id).is_some_and(|r| r.dirty) {
                    return false;
                }
                inner.records.insert(
                    record.record_id,
                    CachedRow::confirmed(record.clone(), record.version),
                );
            }
            ChangedEntity::Event(event) => {
                if inner.events.get(&event.id).is_some_and(|r| r.dirty) {
                    return false;
                }
                inner
                    .events
                    .insert(event.id, CachedRow::confirmed(event.clone(), event.version));
            }
            ChangedEntity::Note(note) => {
                if inner.notes.get(&note.record_id).is_some_and(|r| r.dirty) {
                    return false;
                }
                inner.notes.insert(
                    note.record_id,
                    CachedRow::confirmed(note.clone(), note.version),
                );
            }
            ChangedEntity::Drawing(drawing) => {
                if inner.drawings.get(&drawing.key).is_some_and(|r| r.dirty) {
                    return false;
                }
                inner.drawings.insert(
                    drawing.key,
                    CachedRow::confirmed(drawing.clone(), drawing.version),
                );
            }
        }
        true
    }

    // -- push side ----------------------------------------------------------

    /// All dirty rows in push order: records first (identity before the
    /// rows referencing it), then events, notes, drawings.
    pub fn dirty_rows(&self) -> Vec<PendingWrite> {
        let inner = self.inner.read();
        let mut writes = Vec::new();
        for row in inner.records.values().filter(|r| r.dirty) {
            writes.push(PendingWrite {
                payload: EntityPayload::Record(row.entity.clone()),
                expected: row.server_version,
            });
        }
        for row in inner.events.values().filter(|r| r.dirty) {
            writes.push(PendingWrite {
                payload: EntityPayload::Event(row.entity.clone()),
                expected: row.server_version,
            });
        }
        for row in inner.notes.values().filter(|r| r.dirty) {
            writes.push(PendingWrite {
                payload: EntityPayload::Note(row.entity.clone()),
                expected: row.server_version,
            });
        }
        for row in inner.drawings.values().filter(|r| r.dirty) {
            writes.push(PendingWrite {
                payload: EntityPayload::Drawing(row.entity.clone()),
                expected: row.server_version,
            });
        }
        writes
    }

    /// Confirms a pushed row with the state the server stored: the row
    /// becomes clean at the server's version.
    pub fn confirm(&self, payload: &EntityPayload) {
        let mut inner = self.inner.write();
        match payload {
            EntityPayload::Record(record) => {
                inner.records.insert(
                    record.record_id,
                    CachedRow::confirmed(record.clone(), record.version),
                );
            }
            EntityPayload::Event(event) => {
                inner
                    .events
                    .insert(event.id, CachedRow::confirmed(event.clone(), event.version));
            }
            EntityPayload::Note(note) => {
                inner.notes.insert(
                    note.record_id,
                    CachedRow::confirmed(note.clone(), note.version),
                );
            }
            EntityPayload::Drawing(drawing) => {
                inner.drawings.insert(
                    drawing.key,
                    CachedRow::confirmed(drawing.clone(), drawing.version),
                );
            }
        }
    }

    /// Rewrites a local identity to the canonical one the server resolved.
    ///
    /// Events and the note that referenced the provisional `record_id` are
    /// re-keyed before they are pushed, so they land under the canonical
    /// record on the server. Their dirty flags are preserved.
    pub fn adopt_record(&self, provisional: RecordId, canonical: &Record) {
        let mut inner = self.inner.write();
        inner.records.remove(&provisional);
        inner.records.insert(
            canonical.record_id,
            CachedRow::confirmed(canonical.clone(), canonical.version),
        );

        for row in inner.events.values_mut() {
            if row.entity.record_id == provisional {
                row.entity.record_id = canonical.record_id;
            }
        }

        if let Some(mut moved) = inner.notes.remove(&provisional) {
            moved.entity.record_id = canonical.record_id;
            match inner.notes.get(&canonical.record_id) {
                // A note already lives under the canonical identity; the
                // moved pages win only if they were actually edited here.
                Some(_) if !moved.dirty => {}
                Some(existing) => {
                    moved.server_version = existing.server_version;
                    inner.notes.insert(canonical.record_id, moved);
                }
                None => {
                    inner.notes.insert(canonical.record_id, moved);
                }
            }
        }
        debug!(provisional = %provisional, canonical = %canonical.record_id, "adopted canonical record");
    }

    // -- reads --------------------------------------------------------------

    /// Point lookup of a record.
    pub fn get_record(&self, record_id: RecordId) -> Option<Record> {
        self.inner.read().records.get(&record_id).map(|r| r.entity.clone())
    }

    /// Point lookup of an event.
    pub fn get_event(&self, event_id: EventId) -> Option<Event> {
        self.inner.read().events.get(&event_id).map(|r| r.entity.clone())
    }

    /// Point lookup of a note.
    pub fn get_note(&self, record_id: RecordId) -> Option<Note> {
        self.inner.read().notes.get(&record_id).map(|r| r.entity.clone())
    }

    /// Point lookup of a drawing.
    pub fn get_drawing(&self, key: &DrawingKey) -> Option<Drawing> {
        self.inner.read().drawings.get(key).map(|r| r.entity.clone())
    }

    /// Live cached events of a book within `[start, end)`, by start time.
    pub fn events_in_range(
        &self,
        book_id: BookId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Event> {
        let inner = self.inner.read();
        let mut events: Vec<Event> = inner
            .events
            .values()
            .map(|r| &r.entity)
            .filter(|e| {
                e.book_id == book_id && !e.is_removed && e.start_time >= start && e.start_time < end
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start_time);
        events
    }

    /// Whether the row at `key` carries an unpushed edit.
    pub fn is_dirty(&self, key: &EntityKey) -> bool {
        let inner = self.inner.read();
        match key {
            EntityKey::Record(id) => inner.records.get(id).map(|r| r.dirty),
            EntityKey::Event(id) => inner.events.get(id).map(|r| r.dirty),
            EntityKey::Note(id) => inner.notes.get(id).map(|r| r.dirty),
            EntityKey::Drawing(k) => inner.drawings.get(k).map(|r| r.dirty),
        }
        .unwrap_or(false)
    }

    /// Last confirmed server version of the row at `key`.
    pub fn server_version(&self, key: &EntityKey) -> Option<Version> {
        let inner = self.inner.read();
        match key {
            EntityKey::Record(id) => inner.records.get(id).and_then(|r| r.server_version),
            EntityKey::Event(id) => inner.events.get(id).and_then(|r| r.server_version),
            EntityKey::Note(id) => inner.notes.get(id).and_then(|r| r.server_version),
            EntityKey::Drawing(k) => inner.drawings.get(k).and_then(|r| r.server_version),
        }
    }

    /// Number of rows with unpushed edits.
    pub fn dirty_count(&self) -> usize {
        let inner = self.inner.read();
        inner.records.values().filter(|r| r.dirty).count()
            + inner.events.values().filter(|r| r.dirty).count()
            + inner.notes.values().filter(|r| r.dirty).count()
            + inner.drawings.values().filter(|r| r.dirty).count()
    }

    // -- persistence --------------------------------------------------------

    /// Writes the whole cache, cursor included, as a CBOR snapshot.
    pub fn save_to(&self, path: &Path) -> SyncResult<()> {
        let bytes = to_cbor(&*self.inner.read())?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Loads a cache previously written by [`LocalCache::save_to`].
    pub fn load_from(path: &Path) -> SyncResult<Self> {
        let bytes = std::fs::read(path)?;
        let inner: CacheInner = from_cbor(&bytes)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
        })
    }
}
