use std::path::Path;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use rocksdb::{Direction, IteratorMode, Options, WriteOptions, DB};

use crate::contracts::{
    validate_sequence_name, CreatePolicy, LockResultExt, SequenceError, SequenceRecord,
    SequenceStore, StorageError,
};

/// Key prefix for sequence counters
const SEQUENCE_PREFIX: &str = "seq";

/// Per-name slot guarding the cached value. `None` means the counter is absent.
type CounterSlot = Arc<Mutex<Option<u64>>>;

/// Configuration for the RocksDB sequence store.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Fsync the WAL before an increment is returned.
    pub sync_writes: bool,
    /// Behaviour of `next_value` for missing counters.
    pub create_policy: CreatePolicy,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            sync_writes: true,
            create_policy: CreatePolicy::Upsert,
        }
    }
}

impl RocksDbConfig {
    /// Creates a config from environment variables.
    ///
    /// Reads:
    /// - `SEQD_SYNC_WRITES`: fsync each increment (default: true)
    /// - `SEQD_CREATE_POLICY`: `upsert` or `require_existing` (default: upsert)
    pub fn from_env() -> Result<Self, String> {
        let default = Self::default();

        let sync_writes = std::env::var("SEQD_SYNC_WRITES")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(default.sync_writes);

        let create_policy = match std::env::var("SEQD_CREATE_POLICY") {
            Ok(v) => v.parse()?,
            Err(_) => default.create_policy,
        };

        Ok(Self {
            sync_writes,
            create_policy,
        })
    }
}

/// RocksDB-backed sequence store.
///
/// Every counter lives under `seq:{name}` as a bincode-encoded
/// [`SequenceRecord`]. Increments for one name are serialized by a per-name
/// mutex held across the database write, so the persisted value only moves
/// forward and every returned value is durable before the caller sees it.
pub struct RocksDbSequenceStore {
    db: DB,
    /// Lazily loaded counter slots (lock-free concurrent map)
    slots: DashMap<String, CounterSlot>,
    config: RocksDbConfig,
}

impl RocksDbSequenceStore {
    /// Opens or creates a sequence store at the given path with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with_config(path, RocksDbConfig::default())
    }

    /// Opens or creates a sequence store at the given path.
    pub fn open_with_config(
        path: impl AsRef<Path>,
        config: RocksDbConfig,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);

        // Counters are tiny and hot; keep the memtable small
        opts.set_write_buffer_size(4 * 1024 * 1024);
        opts.set_max_write_buffer_number(2);
        opts.set_wal_dir(path.join("wal"));

        let db = DB::open(&opts, path).map_err(|e| StorageError::RocksDb(e.to_string()))?;

        tracing::debug!(
            path = %path.display(),
            sync_writes = config.sync_writes,
            create_policy = %config.create_policy,
            "Opened sequence store"
        );

        Ok(Self {
            db,
            slots: DashMap::new(),
            config,
        })
    }

    /// Returns the configuration this store was opened with.
    pub fn config(&self) -> &RocksDbConfig {
        &self.config
    }

    /// Creates a sequence key.
    fn sequence_key(name: &str) -> String {
        format!("{}:{}", SEQUENCE_PREFIX, name)
    }

    fn sequence_prefix_bytes() -> Vec<u8> {
        format!("{}:", SEQUENCE_PREFIX).into_bytes()
    }

    fn serialize_record(record: &SequenceRecord) -> Result<Vec<u8>, StorageError> {
        bincode::serialize(record).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn deserialize_record(bytes: &[u8]) -> Result<SequenceRecord, StorageError> {
        bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        opts
    }

    /// Reads a counter straight from the database.
    fn load_value(&self, name: &str) -> Result<Option<u64>, StorageError> {
        let key = Self::sequence_key(name);
        match self.db.get(key.as_bytes()) {
            Ok(Some(bytes)) => Ok(Some(Self::deserialize_record(&bytes)?.value)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::RocksDb(e.to_string())),
        }
    }

    /// Persists a counter value.
    fn store_value(&self, name: &str, value: u64) -> Result<(), StorageError> {
        let record = SequenceRecord {
            name: name.to_string(),
            value,
        };
        let bytes = Self::serialize_record(&record)?;
        self.db
            .put_opt(
                Self::sequence_key(name).as_bytes(),
                bytes,
                &self.write_options(),
            )
            .map_err(|e| StorageError::RocksDb(e.to_string()))
    }

    /// Slot for a counter that exists. Misses are not cached.
    fn existing_slot(&self, name: &str) -> Result<Option<CounterSlot>, StorageError> {
        if let Some(slot) = self.slots.get(name) {
            return Ok(Some(Arc::clone(slot.value())));
        }

        let Some(value) = self.load_value(name)? else {
            return Ok(None);
        };

        // A writer may have cached the slot since the load; its value wins
        let entry = self
            .slots
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Some(value))));

        Ok(Some(Arc::clone(entry.value())))
    }

    /// Gets or loads the slot for a name that is about to be written.
    fn writable_slot(&self, name: &str) -> Result<CounterSlot, StorageError> {
        if let Some(slot) = self.slots.get(name) {
            return Ok(Arc::clone(slot.value()));
        }

        // Entry API for atomic get-or-insert; the load runs at most once per name
        let entry = self
            .slots
            .entry(name.to_string())
            .or_try_insert_with(|| {
                let value = self.load_value(name)?;
                Ok::<_, StorageError>(Arc::new(Mutex::new(value)))
            })?;

        Ok(Arc::clone(entry.value()))
    }
}

impl SequenceStore for RocksDbSequenceStore {
    fn next_value(&self, name: &str) -> Result<u64, StorageError> {
        validate_sequence_name(name)?;

        let slot = match self.config.create_policy {
            CreatePolicy::Upsert => self.writable_slot(name)?,
            CreatePolicy::RequireExisting => self
                .existing_slot(name)?
                .ok_or_else(|| StorageError::SequenceNotFound(name.to_string()))?,
        };
        let mut current = slot.lock().map_lock_err()?;

        let base = match (*current, self.config.create_policy) {
            (Some(value), _) => value,
            (None, CreatePolicy::Upsert) => {
                tracing::debug!(name = %name, "Creating sequence on first increment");
                0
            }
            (None, CreatePolicy::RequireExisting) => {
                return Err(StorageError::SequenceNotFound(name.to_string()));
            }
        };

        let next = base.checked_add(1).ok_or(SequenceError::Overflow)?;

        // Durable before visible: the slot only advances after the write lands
        self.store_value(name, next)?;
        *current = Some(next);

        Ok(next)
    }

    fn current_value(&self, name: &str) -> Result<u64, StorageError> {
        validate_sequence_name(name)?;

        let slot = self
            .existing_slot(name)?
            .ok_or_else(|| StorageError::SequenceNotFound(name.to_string()))?;
        let current = slot.lock().map_lock_err()?;
        current.ok_or_else(|| StorageError::SequenceNotFound(name.to_string()))
    }

    fn set_value(&self, name: &str, value: u64) -> Result<(), StorageError> {
        validate_sequence_name(name)?;

        let slot = self.writable_slot(name)?;
        let mut current = slot.lock().map_lock_err()?;

        self.store_value(name, value)?;
        *current = Some(value);

        tracing::info!(name = %name, value, "Sequence value set");
        Ok(())
    }

    fn create_sequence(&self, name: &str, initial: u64) -> Result<bool, StorageError> {
        validate_sequence_name(name)?;

        let slot = self.writable_slot(name)?;
        let mut current = slot.lock().map_lock_err()?;

        if current.is_some() {
            return Ok(false);
        }

        self.store_value(name, initial)?;
        *current = Some(initial);

        tracing::info!(name = %name, initial, "Sequence created");
        Ok(true)
    }

    fn list_sequences(&self) -> Result<Vec<SequenceRecord>, StorageError> {
        let prefix = Self::sequence_prefix_bytes();
        let mut records = Vec::new();

        // Keys are sorted, so records come back ordered by name
        for item in self
            .db
            .iterator(IteratorMode::From(prefix.as_slice(), Direction::Forward))
        {
            let (key, value) = item.map_err(|e| StorageError::RocksDb(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            records.push(Self::deserialize_record(&value)?);
        }

        Ok(records)
    }

    fn create_policy(&self) -> CreatePolicy {
        self.config.create_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(policy: CreatePolicy) -> (RocksDbSequenceStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = RocksDbConfig {
            sync_writes: false,
            create_policy: policy,
        };
        let store = RocksDbSequenceStore::open_with_config(dir.path(), config).unwrap();
        (store, dir)
    }

    #[test]
    fn next_value_returns_consecutive_integers() {
        let (store, _dir) = open_store(CreatePolicy::Upsert);
        for expected in 1..=50 {
            assert_eq!(store.next_value("waypoint_id").unwrap(), expected);
        }
        assert_eq!(store.current_value("waypoint_id").unwrap(), 50);
    }

    #[test]
    fn seeded_counter_continues_from_initial_value() {
        let (store, _dir) = open_store(CreatePolicy::Upsert);
        assert!(store.create_sequence("waypoint_id", 8).unwrap());
        assert_eq!(store.current_value("waypoint_id").unwrap(), 8);
        assert_eq!(store.next_value("waypoint_id").unwrap(), 9);
    }

    #[test]
    fn set_value_overrides_current() {
        let (store, _dir) = open_store(CreatePolicy::Upsert);
        store.create_sequence("waypoint_id", 8).unwrap();
        store.set_value("waypoint_id", 666).unwrap();
        assert_eq!(store.current_value("waypoint_id").unwrap(), 666);
        assert_eq!(store.next_value("waypoint_id").unwrap(), 667);
    }

    #[test]
    fn require_existing_leaves_store_untouched() {
        let (store, _dir) = open_store(CreatePolicy::RequireExisting);
        assert!(matches!(
            store.next_value("orders"),
            Err(StorageError::SequenceNotFound(_))
        ));
        assert!(store.list_sequences().unwrap().is_empty());
        assert!(matches!(
            store.current_value("orders"),
            Err(StorageError::SequenceNotFound(_))
        ));
    }

    #[test]
    fn missing_names_are_not_cached() {
        let (store, _dir) = open_store(CreatePolicy::RequireExisting);
        for i in 0..1_000 {
            let name = format!("missing-{}", i);
            assert!(store.current_value(&name).is_err());
            assert!(store.next_value(&name).is_err());
        }
        assert_eq!(store.slots.len(), 0);
        assert!(store.list_sequences().unwrap().is_empty());

        let (store, _dir) = open_store(CreatePolicy::Upsert);
        assert!(store.current_value("missing").is_err());
        assert_eq!(store.slots.len(), 0);
        store.next_value("present").unwrap();
        assert_eq!(store.slots.len(), 1);
    }

    #[test]
    fn existing_counter_is_found_after_reopen() {
        let dir = TempDir::new().unwrap();
        let config = RocksDbConfig {
            sync_writes: false,
            create_policy: CreatePolicy::RequireExisting,
        };
        {
            let store = RocksDbSequenceStore::open_with_config(dir.path(), config.clone()).unwrap();
            store.create_sequence("orders", 41).unwrap();
        }

        let store = RocksDbSequenceStore::open_with_config(dir.path(), config).unwrap();
        assert_eq!(store.slots.len(), 0);
        assert_eq!(store.current_value("orders").unwrap(), 41);
        assert_eq!(store.next_value("orders").unwrap(), 42);
        assert_eq!(store.slots.len(), 1);
    }

    #[test]
    fn overflow_keeps_stored_value() {
        let (store, _dir) = open_store(CreatePolicy::Upsert);
        store.set_value("edge", u64::MAX).unwrap();
        assert!(matches!(
            store.next_value("edge"),
            Err(StorageError::Sequence(SequenceError::Overflow))
        ));
        assert_eq!(store.current_value("edge").unwrap(), u64::MAX);
    }

    #[test]
    fn list_returns_records_sorted_by_name() {
        let (store, _dir) = open_store(CreatePolicy::Upsert);
        store.next_value("b").unwrap();
        store.next_value("a").unwrap();
        store.next_value("a").unwrap();
        store.set_value("c", 40).unwrap();

        let records = store.list_sequences().unwrap();
        assert_eq!(
            records,
            vec![
                SequenceRecord {
                    name: "a".into(),
                    value: 2
                },
                SequenceRecord {
                    name: "b".into(),
                    value: 1
                },
                SequenceRecord {
                    name: "c".into(),
                    value: 40
                },
            ]
        );
    }

    #[test]
    fn names_with_separators_are_isolated() {
        let (store, _dir) = open_store(CreatePolicy::Upsert);
        store.next_value("a:b").unwrap();
        store.next_value("a").unwrap();
        store.next_value("a").unwrap();

        assert_eq!(store.current_value("a:b").unwrap(), 1);
        assert_eq!(store.current_value("a").unwrap(), 2);
    }
}
