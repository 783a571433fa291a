pub mod error;
pub mod name;
pub mod sequence;
pub mod store;

pub use error::{LockResultExt, SeqdError, SequenceError, StorageError};
pub use name::{validate_sequence_name, MAX_SEQUENCE_NAME_LEN};
pub use sequence::SequenceGenerator;
pub use store::{CreatePolicy, NamedSequence, SequenceRecord, SequenceStore};
