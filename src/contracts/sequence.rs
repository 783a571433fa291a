/// A single monotonically increasing counter.
///
/// # Invariants
/// - `next()` returns `current() + 1` and never wraps
/// - Concurrent callers never observe the same value from `next()`
pub trait SequenceGenerator: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Increments the counter and returns the new value.
    fn next(&self) -> Result<u64, Self::Error>;

    /// Returns the current value without incrementing.
    fn current(&self) -> Result<u64, Self::Error>;

    /// Overwrites the current value. The following `next()` returns `value + 1`.
    fn set(&self, value: u64) -> Result<(), Self::Error>;
}
