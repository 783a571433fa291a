#![no_main]

use libfuzzer_sys::fuzz_target;
use seqd::contracts::SequenceStore;
use seqd::storage::{MemorySequenceStore, RocksDbSequenceStore};
use tempfile::TempDir;

fuzz_target!(|data: &[u8]| {
    // Arbitrary names: unicode, separators, control characters, oversize
    let dir = TempDir::new().unwrap();
    let store = RocksDbSequenceStore::open(dir.path()).unwrap();
    let memory = MemorySequenceStore::new();

    let name = String::from_utf8_lossy(data);

    // Both stores must agree on which names are accepted and never panic
    let rocks_next = store.next_value(&name);
    let memory_next = memory.next_value(&name);
    assert_eq!(rocks_next.is_ok(), memory_next.is_ok());

    if let Ok(value) = rocks_next {
        assert_eq!(value, 1);
        assert_eq!(store.current_value(&name).unwrap(), 1);
        let listed = store.list_sequences().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, name);
    }
});
