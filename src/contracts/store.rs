use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::contracts::error::StorageError;
use crate::contracts::sequence::SequenceGenerator;

/// Persistent store of named counters.
///
/// # Invariants
/// - `next_value` is atomic per name: no two callers observe the same value
/// - Values for a name increase by exactly 1 per `next_value`
/// - Names are isolated: operations on one name never change another
/// - Counters are never deleted
pub trait SequenceStore: Send + Sync {
    /// Atomically increments the counter for `name` and returns the new value.
    ///
    /// Under [`CreatePolicy::Upsert`] a missing counter is created at 0, so the
    /// first call returns 1. Under [`CreatePolicy::RequireExisting`] a missing
    /// counter is an error.
    fn next_value(&self, name: &str) -> Result<u64, StorageError>;

    /// Returns the current value for `name` without incrementing it.
    fn current_value(&self, name: &str) -> Result<u64, StorageError>;

    /// Overwrites the value for `name`, creating the counter if needed.
    fn set_value(&self, name: &str, value: u64) -> Result<(), StorageError>;

    /// Creates the counter at `initial` if it does not exist yet.
    /// Returns false, leaving the counter untouched, if it already existed.
    fn create_sequence(&self, name: &str, initial: u64) -> Result<bool, StorageError>;

    /// Lists every counter, sorted by name.
    fn list_sequences(&self) -> Result<Vec<SequenceRecord>, StorageError>;

    /// The policy applied when `next_value` meets a missing counter.
    fn create_policy(&self) -> CreatePolicy;
}

/// A named counter and its current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub name: String,
    pub value: u64,
}

/// What `next_value` does when the counter does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreatePolicy {
    /// Create the counter at 0 and increment it.
    #[default]
    Upsert,
    /// Fail with `StorageError::SequenceNotFound`.
    RequireExisting,
}

impl FromStr for CreatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upsert" => Ok(CreatePolicy::Upsert),
            "require_existing" | "require-existing" => Ok(CreatePolicy::RequireExisting),
            other => Err(format!("unknown create policy: {}", other)),
        }
    }
}

impl fmt::Display for CreatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreatePolicy::Upsert => f.write_str("upsert"),
            CreatePolicy::RequireExisting => f.write_str("require_existing"),
        }
    }
}

/// Handle to one counter of a store.
///
/// ```
/// use seqd::contracts::{NamedSequence, SequenceGenerator};
/// use seqd::storage::MemorySequenceStore;
///
/// let store = MemorySequenceStore::new();
/// let waypoint_ids = NamedSequence::new(&store, "waypoint_id");
/// assert_eq!(waypoint_ids.next().unwrap(), 1);
/// assert_eq!(waypoint_ids.current().unwrap(), 1);
/// ```
pub struct NamedSequence<'a, S: SequenceStore + ?Sized> {
    store: &'a S,
    name: String,
}

impl<'a, S: SequenceStore + ?Sized> NamedSequence<'a, S> {
    pub fn new(store: &'a S, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }
}

impl<S: SequenceStore + ?Sized> SequenceGenerator for NamedSequence<'_, S> {
    type Error = StorageError;

    fn next(&self) -> Result<u64, StorageError> {
        self.store.next_value(&self.name)
    }

    fn current(&self) -> Result<u64, StorageError> {
        self.store.current_value(&self.name)
    }

    fn set(&self, value: u64) -> Result<(), StorageError> {
        self.store.set_value(&self.name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_policy_parses_known_values() {
        assert_eq!("upsert".parse(), Ok(CreatePolicy::Upsert));
        assert_eq!("UPSERT".parse(), Ok(CreatePolicy::Upsert));
        assert_eq!(
            "require_existing".parse(),
            Ok(CreatePolicy::RequireExisting)
        );
        assert_eq!(
            " require-existing ".parse(),
            Ok(CreatePolicy::RequireExisting)
        );
        assert!("create".parse::<CreatePolicy>().is_err());
    }

    #[test]
    fn create_policy_display_round_trips() {
        for policy in [CreatePolicy::Upsert, CreatePolicy::RequireExisting] {
            assert_eq!(policy.to_string().parse(), Ok(policy));
        }
    }
}
