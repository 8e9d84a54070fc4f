//! All-or-nothing batch saves.
//!
//! A batch is validated in full before anything is written: size limit,
//! book and record existence, key scoping, and every item's version gate.
//! Only when no check fails are the items applied, still under the same
//! write lock, so the store moves from "none of the batch" to "all of the
//! batch" with no observable state in between.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::store::{CasebookStore, Tables};
use casebook_protocol::{
    BatchConflict, BatchSaveRequest, BatchSaveResponse, BatchSaveResult, VersionConflict,
};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Applies batch save requests atomically against a store.
#[derive(Clone)]
pub struct BatchEngine {
    store: CasebookStore,
    config: ServerConfig,
}

impl BatchEngine {
    /// Creates an engine with the given limits.
    pub fn new(store: CasebookStore, config: ServerConfig) -> Self {
        Self { store, config }
    }

    /// Validates and applies a batch. Every non-`Saved` outcome guarantees
    /// that no item of the batch was written.
    ///
    /// Credential checking is the handler's concern; by the time a request
    /// reaches the engine its device is already trusted.
    pub fn save(&self, request: &BatchSaveRequest) -> BatchSaveResult {
        let items = request.item_count();
        if items > self.config.max_batch_items {
            warn!(items, limit = self.config.max_batch_items, "batch rejected: too large");
            return BatchSaveResult::PayloadTooLarge {
                items,
                limit: self.config.max_batch_items,
            };
        }

        let mut tables = self.store.write();
        if let Err(reason) = validate(&tables, request) {
            return reason;
        }
        apply(&mut tables, request)
    }
}

/// All failure checks, run before the first write.
fn validate(tables: &Tables, request: &BatchSaveRequest) -> Result<(), BatchSaveResult> {
    if !tables.books.contains_key(&request.book_id) {
        return Err(BatchSaveResult::Invalid(format!(
            "unknown book {}",
            request.book_id
        )));
    }

    let mut seen_notes = HashSet::new();
    for write in &request.notes {
        if !seen_notes.insert(write.record_id) {
            return Err(BatchSaveResult::Invalid(format!(
                "duplicate note for record {} in one batch",
                write.record_id
            )));
        }
        if !tables.records.contains_key(&write.record_id) {
            return Err(BatchSaveResult::Invalid(format!(
                "unknown record {}",
                write.record_id
            )));
        }
        match (tables.notes.get(&write.record_id), write.expected_version) {
            (Some(stored), Some(expected)) if stored.version != expected => {
                return Err(BatchSaveResult::Conflict(BatchConflict::Note {
                    record_id: write.record_id,
                    conflict: VersionConflict {
                        server_version: stored.version,
                        server_entity: stored.clone(),
                    },
                }));
            }
            // A missing row is a create; the expectation is ignored.
            _ => {}
        }
    }

    let mut seen_drawings = HashSet::new();
    for write in &request.drawings {
        if write.key.book_id != request.book_id {
            return Err(BatchSaveResult::Invalid(format!(
                "drawing {} does not belong to book {}",
                write.key, request.book_id
            )));
        }
        if !seen_drawings.insert(write.key) {
            return Err(BatchSaveResult::Invalid(format!(
                "duplicate drawing {} in one batch",
                write.key
            )));
        }
        match (tables.drawings.get(&write.key), write.expected_version) {
            (Some(stored), Some(expected)) if stored.version != expected => {
                return Err(BatchSaveResult::Conflict(BatchConflict::Drawing {
                    key: write.key,
                    conflict: VersionConflict {
                        server_version: stored.version,
                        server_entity: stored.clone(),
                    },
                }));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Writes every item. Validation has already admitted each one, so the
/// per-item upserts cannot fail while the lock is still held.
fn apply(tables: &mut Tables, request: &BatchSaveRequest) -> BatchSaveResult {
    let mut response = BatchSaveResponse {
        note_records: Vec::with_capacity(request.notes.len()),
        drawing_keys: Vec::with_capacity(request.drawings.len()),
    };

    for write in &request.notes {
        match tables.upsert_note(write.record_id, write.pages.clone(), write.expected_version) {
            Ok(note) => response.note_records.push(note.record_id),
            Err(err) => return internal(err),
        }
    }
    for write in &request.drawings {
        match tables.upsert_drawing(write.key, write.strokes.clone(), write.expected_version) {
            Ok(drawing) => response.drawing_keys.push(drawing.key),
            Err(err) => return internal(err),
        }
    }

    debug!(
        notes = response.note_records.len(),
        drawings = response.drawing_keys.len(),
        "batch saved"
    );
    BatchSaveResult::Saved(response)
}

fn internal(err: ServerError) -> BatchSaveResult {
    warn!(%err, "batch apply failed after validation");
    BatchSaveResult::Internal(err.to_string())
}
