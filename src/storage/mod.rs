mod memory;
mod rocksdb;
mod sequence;

pub use memory::MemorySequenceStore;
pub use rocksdb::{RocksDbConfig, RocksDbSequenceStore};
pub use sequence::AtomicSequenceGenerator;
