//! Record identity resolution.
//!
//! A non-empty record number is the identity key: the first device to create
//! it decides the canonical `record_id`, and every later resolve of the same
//! number adopts that identity, whatever `record_id` the caller proposed.
//! Anonymous records (empty number) are keyed by their caller-minted
//! `record_id` alone; two devices creating anonymous records concurrently
//! end up with two records, which is the documented gap of this resolver.

use crate::error::{ServerError, ServerResult};
use crate::store::{CasebookStore, Tables};
use casebook_model::{Record, RecordId};
use casebook_protocol::{ChangedEntity, RecordIdentity};
use tracing::debug;

/// Resolve-or-create gateway for record identities.
///
/// All writes to the record-number index go through here or through
/// `update_record`; nothing else may mint a numbered record.
#[derive(Clone)]
pub struct RecordResolver {
    store: CasebookStore,
}

impl RecordResolver {
    /// Creates a resolver over the given store.
    pub fn new(store: CasebookStore) -> Self {
        Self { store }
    }

    /// Resolves identity material to the canonical record, creating one if
    /// the identity is new. The whole decision runs under one write lock, so
    /// two concurrent resolves of the same number cannot both create.
    pub fn resolve(&self, identity: &RecordIdentity) -> ServerResult<Record> {
        resolve_in(&mut self.store.write(), identity)
    }
}

/// Lock-held resolve, for callers that must stay inside a larger
/// transaction (event creation resolves its record under the same lock as
/// the event write).
pub(crate) fn resolve_in(
    tables: &mut Tables,
    identity: &RecordIdentity,
) -> ServerResult<Record> {
    if !identity.record_number.is_empty() {
        if let Some(holder) = tables.record_numbers.get(&identity.record_number) {
            let canonical = tables.records.get(holder).cloned().ok_or_else(|| {
                ServerError::Internal(format!(
                    "record number {:?} indexes missing record {holder}",
                    identity.record_number
                ))
            })?;
            if identity.record_id.is_some_and(|id| id != canonical.record_id) {
                debug!(
                    number = %identity.record_number,
                    proposed = %identity.record_id.unwrap_or(canonical.record_id),
                    canonical = %canonical.record_id,
                    "record number already claimed; caller adopts canonical identity"
                );
            }
            return Ok(canonical);
        }
    } else if let Some(record_id) = identity.record_id {
        if let Some(existing) = tables.records.get(&record_id) {
            return Ok(existing.clone());
        }
    }

    // New identity. Honor the caller-minted id unless it is already taken
    // by a different record.
    let record_id = match identity.record_id {
        Some(id) if !tables.records.contains_key(&id) => id,
        _ => RecordId::new(),
    };
    let record = Record::new(
        record_id,
        identity.record_number.clone(),
        identity.name.clone(),
        identity.phone.clone(),
    );
    tables.records.insert(record_id, record.clone());
    if record.has_number() {
        tables
            .record_numbers
            .insert(record.record_number.clone(), record_id);
    }
    tables.changes.record(ChangedEntity::Record(record.clone()));
    debug!(record = %record_id, number = %record.record_number, "created record");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use casebook_model::Version;

    fn identity(number: &str, record_id: Option<RecordId>) -> RecordIdentity {
        RecordIdentity {
            record_id,
            record_number: number.into(),
            name: "Alice".into(),
            phone: None,
        }
    }

    #[test]
    fn first_create_honors_caller_id() {
        let resolver = RecordResolver::new(CasebookStore::new());
        let proposed = RecordId::new();
        let record = resolver.resolve(&identity("001", Some(proposed))).unwrap();
        assert_eq!(record.record_id, proposed);
        assert_eq!(record.version, Version::FIRST);
    }

    #[test]
    fn second_create_adopts_the_winner() {
        let store = CasebookStore::new();
        let resolver = RecordResolver::new(store);

        let winner = resolver
            .resolve(&identity("001", Some(RecordId::new())))
            .unwrap();
        let loser_proposal = RecordId::new();
        let resolved = resolver
            .resolve(&identity("001", Some(loser_proposal)))
            .unwrap();

        assert_eq!(resolved.record_id, winner.record_id);
        assert_ne!(resolved.record_id, loser_proposal);
        // No second record was minted.
        assert_eq!(resolver.store.read().records.len(), 1);
    }

    #[test]
    fn concurrent_resolves_of_one_number_converge() {
        let resolver = RecordResolver::new(CasebookStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = resolver.clone();
                std::thread::spawn(move || {
                    resolver
                        .resolve(&identity("001", Some(RecordId::new())))
                        .unwrap()
                        .record_id
                })
            })
            .collect();
        let ids: Vec<RecordId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(resolver.store.read().records.len(), 1);
    }

    #[test]
    fn anonymous_records_do_not_unify() {
        let resolver = RecordResolver::new(CasebookStore::new());
        let a = resolver.resolve(&identity("", Some(RecordId::new()))).unwrap();
        let b = resolver.resolve(&identity("", Some(RecordId::new()))).unwrap();
        assert_ne!(a.record_id, b.record_id);
    }

    #[test]
    fn anonymous_resolve_by_id_is_idempotent() {
        let resolver = RecordResolver::new(CasebookStore::new());
        let id = RecordId::new();
        let a = resolver.resolve(&identity("", Some(id))).unwrap();
        let b = resolver.resolve(&identity("", Some(id))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn dangling_number_index_is_an_error_not_a_panic() {
        let store = CasebookStore::new();
        store
            .write()
            .record_numbers
            .insert("001".into(), RecordId::new());

        let resolver = RecordResolver::new(store);
        let err = resolver.resolve(&identity("001", None)).unwrap_err();
        assert!(matches!(err, ServerError::Internal(_)));
    }

    #[test]
    fn deleted_record_frees_its_number_for_a_new_identity() {
        let resolver = RecordResolver::new(CasebookStore::new());
        let first = resolver.resolve(&identity("001", None)).unwrap();
        resolver.store.delete_record(first.record_id).unwrap();

        let second = resolver.resolve(&identity("001", None)).unwrap();
        assert_ne!(second.record_id, first.record_id);
        assert!(!second.is_deleted);
    }
}
