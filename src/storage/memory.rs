use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::contracts::{
    validate_sequence_name, CreatePolicy, SequenceGenerator, SequenceRecord, SequenceStore,
    StorageError,
};
use crate::storage::AtomicSequenceGenerator;

/// In-memory sequence store. Counters are lost when the store is dropped.
pub struct MemorySequenceStore {
    sequences: DashMap<String, Arc<AtomicSequenceGenerator>>,
    create_policy: CreatePolicy,
}

impl MemorySequenceStore {
    pub fn new() -> Self {
        Self::with_policy(CreatePolicy::default())
    }

    pub fn with_policy(create_policy: CreatePolicy) -> Self {
        Self {
            sequences: DashMap::new(),
            create_policy,
        }
    }

    fn get(&self, name: &str) -> Option<Arc<AtomicSequenceGenerator>> {
        self.sequences.get(name).map(|e| Arc::clone(e.value()))
    }
}

impl Default for MemorySequenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceStore for MemorySequenceStore {
    fn next_value(&self, name: &str) -> Result<u64, StorageError> {
        validate_sequence_name(name)?;

        let seq = match self.create_policy {
            CreatePolicy::Upsert => match self.get(name) {
                Some(seq) => seq,
                None => Arc::clone(self.sequences.entry(name.to_string()).or_default().value()),
            },
            CreatePolicy::RequireExisting => self
                .get(name)
                .ok_or_else(|| StorageError::SequenceNotFound(name.to_string()))?,
        };

        Ok(seq.next()?)
    }

    fn current_value(&self, name: &str) -> Result<u64, StorageError> {
        validate_sequence_name(name)?;
        let seq = self
            .get(name)
            .ok_or_else(|| StorageError::SequenceNotFound(name.to_string()))?;
        Ok(seq.current()?)
    }

    fn set_value(&self, name: &str, value: u64) -> Result<(), StorageError> {
        validate_sequence_name(name)?;
        let seq = Arc::clone(self.sequences.entry(name.to_string()).or_default().value());
        Ok(seq.set(value)?)
    }

    fn create_sequence(&self, name: &str, initial: u64) -> Result<bool, StorageError> {
        validate_sequence_name(name)?;
        match self.sequences.entry(name.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(AtomicSequenceGenerator::starting_from(initial)));
                Ok(true)
            }
        }
    }

    fn list_sequences(&self) -> Result<Vec<SequenceRecord>, StorageError> {
        let mut records = self
            .sequences
            .iter()
            .map(|e| -> Result<SequenceRecord, StorageError> {
                Ok(SequenceRecord {
                    name: e.key().clone(),
                    value: e.value().current()?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    fn create_policy(&self) -> CreatePolicy {
        self.create_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_next_value_upserts_at_one() {
        let store = MemorySequenceStore::new();
        assert_eq!(store.next_value("waypoint_id").unwrap(), 1);
        assert_eq!(store.next_value("waypoint_id").unwrap(), 2);
        assert_eq!(store.current_value("waypoint_id").unwrap(), 2);
    }

    #[test]
    fn require_existing_rejects_missing_counter() {
        let store = MemorySequenceStore::with_policy(CreatePolicy::RequireExisting);
        assert!(matches!(
            store.next_value("orders"),
            Err(StorageError::SequenceNotFound(name)) if name == "orders"
        ));
        assert!(store.list_sequences().unwrap().is_empty());

        assert!(store.create_sequence("orders", 8).unwrap());
        assert_eq!(store.next_value("orders").unwrap(), 9);
    }

    #[test]
    fn create_sequence_does_not_overwrite() {
        let store = MemorySequenceStore::new();
        assert!(store.create_sequence("orders", 10).unwrap());
        assert!(!store.create_sequence("orders", 500).unwrap());
        assert_eq!(store.current_value("orders").unwrap(), 10);
    }

    #[test]
    fn set_value_then_next() {
        let store = MemorySequenceStore::new();
        store.set_value("orders", 666).unwrap();
        assert_eq!(store.current_value("orders").unwrap(), 666);
        assert_eq!(store.next_value("orders").unwrap(), 667);
    }

    #[test]
    fn current_value_of_missing_counter_is_not_found() {
        let store = MemorySequenceStore::new();
        assert!(matches!(
            store.current_value("missing"),
            Err(StorageError::SequenceNotFound(_))
        ));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let store = MemorySequenceStore::new();
        assert!(matches!(
            store.next_value(""),
            Err(StorageError::InvalidInput(_))
        ));
        assert!(store.list_sequences().unwrap().is_empty());
    }

    #[test]
    fn list_is_sorted_by_name() {
        let store = MemorySequenceStore::new();
        store.next_value("zeta").unwrap();
        store.next_value("alpha").unwrap();
        store.next_value("alpha").unwrap();

        let names: Vec<_> = store
            .list_sequences()
            .unwrap()
            .into_iter()
            .map(|r| (r.name, r.value))
            .collect();
        assert_eq!(names, vec![("alpha".to_string(), 2), ("zeta".to_string(), 1)]);
    }
}
