//! The sync coordinator: pull, then push, then report.
//!
//! A full cycle first drains the server change log into the cache (clean
//! rows overwritten, dirty rows skipped), then pushes every dirty row under
//! its version gate. Stale pushes come back as conflicts in the report; the
//! cycle itself never fails because of a conflict, only because of
//! transport-level trouble.

use crate::cache::LocalCache;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use casebook_model::{BookId, Version};
use casebook_protocol::{
    BatchSaveRequest, BatchSaveResult, ConflictResolution, DrawingWrite, EntityKey, EntityPayload,
    NoteWrite, PullRequest, RecordIdentity, ResolveConflictRequest, ResolveConflictResponse,
    ResolveRecordRequest, UpdateRecordRequest, UpsertDrawingRequest, UpsertEventRequest,
    UpsertNoteRequest, UpsertOutcome, VersionConflict,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Where a coordinator currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No cycle running.
    Idle,
    /// Draining the server change log.
    Pulling,
    /// Pushing dirty rows.
    Pushing,
    /// Applying a conflict resolution.
    Reconciling,
    /// The last cycle ended in a transport-level error.
    Failed,
}

/// Counters from one sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Pulled rows applied to the cache.
    pub pulled: usize,
    /// Pulled rows skipped because the local row was dirty.
    pub skipped_dirty: usize,
    /// Dirty rows accepted by the server.
    pub pushed: usize,
    /// Dirty rows rejected as stale.
    pub conflicts: usize,
    /// Provisional record identities replaced by canonical ones.
    pub adopted_records: usize,
}

/// A push the server rejected as stale, waiting for a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConflict {
    /// Natural key of the entity.
    pub key: EntityKey,
    /// The local state whose push was rejected.
    pub local: EntityPayload,
    /// The server's state at rejection time.
    pub server: EntityPayload,
    /// The server's version at rejection time.
    pub server_version: Version,
}

/// Outcome of a completed sync cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Counters.
    pub stats: SyncStats,
    /// Conflicts awaiting resolution. The rows stay dirty in the cache.
    pub conflicts: Vec<PendingConflict>,
}

impl SyncReport {
    /// True when every dirty row was accepted.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Drives sync cycles over a transport against a local cache.
pub struct SyncCoordinator<T: SyncTransport> {
    transport: T,
    cache: LocalCache,
    config: SyncConfig,
    phase: Mutex<SyncPhase>,
    // Serializes cycles; a sync started while another runs waits its turn.
    cycle: Mutex<()>,
    cancelled: AtomicBool,
}

impl<T: SyncTransport> SyncCoordinator<T> {
    /// Creates a coordinator.
    pub fn new(transport: T, cache: LocalCache, config: SyncConfig) -> Self {
        Self {
            transport,
            cache,
            config,
            phase: Mutex::new(SyncPhase::Idle),
            cycle: Mutex::new(()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// The cache this coordinator syncs.
    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock()
    }

    /// Requests cancellation of the running (or next) cycle. The flag is
    /// consumed by the cycle it aborts.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.lock() = phase;
    }

    /// Runs one full cycle: pull everything, push everything dirty.
    pub fn sync(&self) -> SyncResult<SyncReport> {
        let _cycle = self.cycle.lock();
        let result = self.run_cycle();
        self.cancelled.store(false, Ordering::SeqCst);
        match &result {
            Ok(report) => {
                self.set_phase(SyncPhase::Idle);
                info!(
                    pulled = report.stats.pulled,
                    pushed = report.stats.pushed,
                    conflicts = report.stats.conflicts,
                    "sync cycle finished"
                );
            }
            Err(err) => {
                self.set_phase(SyncPhase::Failed);
                warn!(%err, "sync cycle failed");
            }
        }
        result
    }

    /// Runs `sync`, retrying transport-level failures with backoff.
    pub fn sync_with_retry(&self) -> SyncResult<SyncReport> {
        let mut attempt = 0;
        loop {
            match self.sync() {
                Ok(report) => return Ok(report),
                Err(err) if err.is_retryable() && attempt < self.config.retry.max_retries => {
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    debug!(%err, attempt, ?delay, "retrying sync");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn run_cycle(&self) -> SyncResult<SyncReport> {
        self.check_cancelled()?;
        let mut report = SyncReport::default();

        self.set_phase(SyncPhase::Pulling);
        self.pull_all(&mut report.stats)?;

        self.set_phase(SyncPhase::Pushing);
        self.push_records(&mut report)?;
        self.push_rows(&mut report)?;
        Ok(report)
    }

    fn pull_all(&self, stats: &mut SyncStats) -> SyncResult<()> {
        loop {
            self.check_cancelled()?;
            let page = self.transport.pull(&PullRequest {
                credentials: self.config.credentials.clone(),
                cursor: self.cache.cursor(),
                limit: self.config.pull_batch_size,
            })?;
            for row in &page.rows {
                if self.cache.apply_server_change(&row.entity) {
                    stats.pulled += 1;
                } else {
                    stats.skipped_dirty += 1;
                }
            }
            self.cache.set_cursor(page.new_cursor);
            if !page.has_more {
                return Ok(());
            }
        }
    }

    /// Pushes dirty records before anything that references them. A record
    /// the server has never confirmed goes through identity resolution and
    /// may come back under a different canonical id; dependent rows are
    /// re-keyed before their own push.
    fn push_records(&self, report: &mut SyncReport) -> SyncResult<()> {
        for write in self.cache.dirty_rows() {
            let EntityPayload::Record(record) = write.payload else {
                continue;
            };
            self.check_cancelled()?;

            if write.expected.is_none() {
                let response = self.transport.resolve_record(&ResolveRecordRequest {
                    credentials: self.config.credentials.clone(),
                    identity: RecordIdentity {
                        record_id: Some(record.record_id),
                        record_number: record.record_number.clone(),
                        name: record.name.clone(),
                        phone: record.phone.clone(),
                    },
                })?;
                let canonical = response.record;
                if canonical.record_id != record.record_id {
                    debug!(
                        provisional = %record.record_id,
                        canonical = %canonical.record_id,
                        "record identity adopted during push"
                    );
                    self.cache.adopt_record(record.record_id, &canonical);
                    report.stats.adopted_records += 1;
                } else {
                    self.cache.confirm(&EntityPayload::Record(canonical));
                }
                report.stats.pushed += 1;
                continue;
            }

            let outcome = self.transport.update_record(&UpdateRecordRequest {
                credentials: self.config.credentials.clone(),
                record: record.clone(),
                expected_version: write.expected,
            })?;
            self.settle(
                report,
                EntityKey::Record(record.record_id),
                EntityPayload::Record(record),
                map_outcome(outcome, EntityPayload::Record),
            );
        }
        Ok(())
    }

    /// Pushes the remaining dirty rows. Snapshots the dirty set after the
    /// record pass so re-keyed events and notes push under their canonical
    /// record.
    fn push_rows(&self, report: &mut SyncReport) -> SyncResult<()> {
        for write in self.cache.dirty_rows() {
            self.check_cancelled()?;
            let credentials = self.config.credentials.clone();
            let expected = write.expected;
            match write.payload {
                EntityPayload::Record(_) => {}
                EntityPayload::Event(event) => {
                    let outcome = self.transport.upsert_event(&UpsertEventRequest {
                        credentials,
                        event: event.clone(),
                        expected_version: expected,
                    })?;
                    self.settle(
                        report,
                        EntityKey::Event(event.id),
                        EntityPayload::Event(event),
                        map_outcome(outcome, EntityPayload::Event),
                    );
                }
                EntityPayload::Note(note) => {
                    let outcome = self.transport.upsert_note(&UpsertNoteRequest {
                        credentials,
                        record_id: note.record_id,
                        pages: note.pages.clone(),
                        expected_version: expected,
                    })?;
                    self.settle(
                        report,
                        EntityKey::Note(note.record_id),
                        EntityPayload::Note(note),
                        map_outcome(outcome, EntityPayload::Note),
                    );
                }
                EntityPayload::Drawing(drawing) => {
                    let outcome = self.transport.upsert_drawing(&UpsertDrawingRequest {
                        credentials,
                        key: drawing.key,
                        strokes: drawing.strokes.clone(),
                        expected_version: expected,
                    })?;
                    self.settle(
                        report,
                        EntityKey::Drawing(drawing.key),
                        EntityPayload::Drawing(drawing),
                        map_outcome(outcome, EntityPayload::Drawing),
                    );
                }
            }
        }
        Ok(())
    }

    fn settle(
        &self,
        report: &mut SyncReport,
        key: EntityKey,
        local: EntityPayload,
        outcome: UpsertOutcome<EntityPayload>,
    ) {
        match outcome {
            UpsertOutcome::Applied { entity, .. } => {
                self.cache.confirm(&entity);
                report.stats.pushed += 1;
            }
            UpsertOutcome::Conflict(conflict) => {
                warn!(%key, server = %conflict.server_version, "push rejected as stale");
                report.stats.conflicts += 1;
                report.conflicts.push(PendingConflict {
                    key,
                    local,
                    server_version: conflict.server_version,
                    server: conflict.server_entity,
                });
            }
        }
    }

    /// Applies a decision to a surfaced conflict.
    ///
    /// Returns `None` when the resolution settled; returns a fresh
    /// `PendingConflict` when the server moved again in the meantime and
    /// the decision must be remade against the newer state.
    pub fn resolve(
        &self,
        conflict: &PendingConflict,
        resolution: ConflictResolution,
    ) -> SyncResult<Option<PendingConflict>> {
        self.set_phase(SyncPhase::Reconciling);
        let payload = match resolution {
            ConflictResolution::KeepServer => None,
            ConflictResolution::KeepMine => Some(conflict.local.clone()),
        };
        let response = self.transport.resolve_conflict(&ResolveConflictRequest {
            credentials: self.config.credentials.clone(),
            key: conflict.key,
            resolution,
            expected_version: conflict.server_version,
            payload,
        });
        self.set_phase(SyncPhase::Idle);

        match response? {
            ResolveConflictResponse::Resolved { entity, .. } => {
                self.cache.confirm(&entity);
                Ok(None)
            }
            ResolveConflictResponse::Conflict(VersionConflict {
                server_version,
                server_entity,
            }) => Ok(Some(PendingConflict {
                key: conflict.key,
                local: conflict.local.clone(),
                server: server_entity,
                server_version,
            })),
        }
    }

    /// Writes a batch straight through to the server. The cache is not
    /// touched; the authoritative rows arrive through the next pull.
    pub fn save_batch(
        &self,
        book_id: BookId,
        notes: Vec<NoteWrite>,
        drawings: Vec<DrawingWrite>,
    ) -> SyncResult<BatchSaveResult> {
        self.transport.batch_save(&BatchSaveRequest {
            credentials: self.config.credentials.clone(),
            book_id,
            notes,
            drawings,
        })
    }

    /// Whether the transport currently reports connectivity.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}

fn map_outcome<E>(
    outcome: UpsertOutcome<E>,
    wrap: fn(E) -> EntityPayload,
) -> UpsertOutcome<EntityPayload> {
    match outcome {
        UpsertOutcome::Applied {
            entity,
            new_version,
        } => UpsertOutcome::Applied {
            entity: wrap(entity),
            new_version,
        },
        UpsertOutcome::Conflict(VersionConflict {
            server_version,
            server_entity,
        }) => UpsertOutcome::Conflict(VersionConflict {
            server_version,
            server_entity: wrap(server_entity),
        }),
    }
}
