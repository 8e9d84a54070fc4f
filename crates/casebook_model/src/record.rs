//! Records: the canonical identity for a person or case.

use crate::ids::RecordId;
use crate::version::Version;
use serde::{Deserialize, Serialize};

/// The entity that must converge across devices.
///
/// A non-empty `record_number` is a globally unique business key: at most one
/// non-deleted record may carry it, and concurrent creates on two devices
/// must resolve to a single canonical `record_id`. An empty number marks an
/// anonymous record; anonymous identities created concurrently on two devices
/// are not unified (a documented gap in the identity resolver).
///
/// Records are never physically removed. Soft delete preserves the linkage
/// history of notes and events that reference the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Canonical identity.
    pub record_id: RecordId,
    /// Business key; globally unique when non-empty.
    pub record_number: String,
    /// Display name. Metadata, not part of the identity key.
    pub name: String,
    /// Contact phone, if known.
    pub phone: Option<String>,
    /// Soft-delete marker.
    pub is_deleted: bool,
    /// Optimistic-locking version.
    pub version: Version,
}

impl Record {
    /// Creates a new record at version 1.
    pub fn new(
        record_id: RecordId,
        record_number: impl Into<String>,
        name: impl Into<String>,
        phone: Option<String>,
    ) -> Self {
        Self {
            record_id,
            record_number: record_number.into(),
            name: name.into(),
            phone,
            is_deleted: false,
            version: Version::FIRST,
        }
    }

    /// Returns true if the record carries a business key.
    pub fn has_number(&self) -> bool {
        !self.record_number.is_empty()
    }

    /// Returns true for records without a business key.
    pub fn is_anonymous(&self) -> bool {
        self.record_number.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_record() {
        let r = Record::new(RecordId::new(), "001", "Alice", None);
        assert!(r.has_number());
        assert!(!r.is_anonymous());
        assert_eq!(r.version, Version::FIRST);
    }

    #[test]
    fn anonymous_record() {
        let r = Record::new(RecordId::new(), "", "Walk-in", None);
        assert!(r.is_anonymous());
    }
}
