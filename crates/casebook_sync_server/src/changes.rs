//! Server change log feeding client pulls.

use casebook_protocol::{ChangeRow, ChangedEntity};

/// An append-only log of committed entity changes.
///
/// Every accepted write appends the entity's post-write state under a
/// strictly increasing sequence number. Clients pull pages of rows after
/// their cursor and apply them as unconditional cache upserts.
#[derive(Debug)]
pub struct ChangeLog {
    rows: Vec<ChangeRow>,
    next_sequence: u64,
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeLog {
    /// Creates an empty log. Sequences start at 1; a client cursor of 0
    /// therefore sees every row ever recorded.
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            next_sequence: 1,
        }
    }

    /// Appends a change and returns its sequence number.
    pub fn record(&mut self, entity: ChangedEntity) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.rows.push(ChangeRow { sequence, entity });
        sequence
    }

    /// Returns up to `limit` rows with sequence greater than `cursor`.
    pub fn since(&self, cursor: u64, limit: u32) -> Vec<ChangeRow> {
        self.rows
            .iter()
            .filter(|row| row.sequence > cursor)
            .take(limit as usize)
            .cloned()
            .collect()
    }

    /// Returns true if rows remain beyond `cursor` plus one page of `limit`.
    pub fn has_more_after(&self, cursor: u64, limit: u32) -> bool {
        self.rows.iter().filter(|row| row.sequence > cursor).count() > limit as usize
    }

    /// The highest sequence assigned so far (0 when empty).
    pub fn latest_sequence(&self) -> u64 {
        self.next_sequence.saturating_sub(1)
    }

    /// Number of rows in the log.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no change has been recorded.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
