use std::sync::atomic::{AtomicU64, Ordering};

use crate::contracts::{SequenceError, SequenceGenerator};

/// Atomic sequence generator that maintains a monotonically increasing counter.
///
/// Uses a compare-and-swap loop so the counter is never observed wrapped,
/// even when `next()` fails with `Overflow`.
pub struct AtomicSequenceGenerator {
    counter: AtomicU64,
}

impl AtomicSequenceGenerator {
    /// Creates a new sequence generator starting from 0.
    pub fn new() -> Self {
        Self::starting_from(0)
    }

    /// Creates a sequence generator starting from a specific value.
    pub fn starting_from(value: u64) -> Self {
        Self {
            counter: AtomicU64::new(value),
        }
    }
}

impl Default for AtomicSequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceGenerator for AtomicSequenceGenerator {
    type Error = SequenceError;

    fn next(&self) -> Result<u64, SequenceError> {
        // AcqRel so a concurrent set() is ordered against increments
        let prev = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_add(1))
            .map_err(|_| SequenceError::Overflow)?;
        Ok(prev + 1)
    }

    fn current(&self) -> Result<u64, SequenceError> {
        Ok(self.counter.load(Ordering::Acquire))
    }

    fn set(&self, value: u64) -> Result<(), SequenceError> {
        self.counter.store(value, Ordering::Release);
        Ok(())
    }
}
