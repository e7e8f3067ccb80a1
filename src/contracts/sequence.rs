use crate::contracts::error::CoreError;

/// Issues unique, monotonically increasing integer ids per named counter.
///
/// # Invariants
/// - Values for one counter are strictly increasing; no value is issued twice,
///   even under concurrent callers.
/// - A value is durably persisted before it is returned (no read-only peek).
/// - Issued ids are never reclaimed, including after the entity they were
///   issued for is deleted.
/// - Safe to call from inside or outside a coordinator-managed transaction;
///   atomicity comes from the increment itself, not the caller's transaction.
pub trait SequenceAllocator: Send + Sync {
    /// Returns the next id for `counter`.
    /// A counter that has never been used starts at 1 (upsert semantics).
    fn next(&self, counter: &str) -> Result<u64, CoreError>;

    /// Returns the last issued id without incrementing (0 if never used).
    fn current(&self, counter: &str) -> Result<u64, CoreError>;
}
