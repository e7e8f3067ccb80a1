use std::sync::{Arc, Mutex};

use backon::BlockingRetryable;
use dashmap::DashMap;

use crate::contracts::{CoreError, LockResultExt, SequenceAllocator};
use crate::store::docstore::DocStore;
use crate::store::retry::RetryPolicy;

/// Allocator over durable per-counter records.
///
/// Each counter lives in a `seq:{name}` record holding the last issued value.
/// Increments are serialized per counter and persisted through their own
/// one-shot transaction before the value is returned, so the allocator never
/// rides on a caller's transaction and never hands out the same value twice.
/// An aborted enclosing transaction leaves a gap in the sequence, which is
/// permitted; ids are never reused.
pub struct CounterAllocator {
    store: Arc<DocStore>,
    policy: RetryPolicy,
    /// Per-counter cells holding the last issued value (lazily seeded from the store)
    cells: DashMap<String, Arc<Mutex<u64>>>,
}

impl CounterAllocator {
    pub fn new(store: Arc<DocStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            cells: DashMap::new(),
        }
    }

    /// Gets or seeds the cell for a counter from its persisted record.
    /// A counter that has never been used seeds to 0.
    fn cell(&self, counter: &str) -> Result<Arc<Mutex<u64>>, CoreError> {
        let entry = self.cells.entry(counter.to_string()).or_try_insert_with(|| {
            let txn = self.store.begin();
            let seeded = txn.get_counter(counter)?.unwrap_or(0);
            Ok::<_, CoreError>(Arc::new(Mutex::new(seeded)))
        })?;
        Ok(Arc::clone(entry.value()))
    }

    /// Persists a counter value through its own transaction, retrying
    /// transient failures under the shared policy.
    fn persist(&self, counter: &str, value: u64) -> Result<(), CoreError> {
        let attempt = || {
            let txn = self.store.begin();
            txn.put_counter(counter, value)?;
            txn.commit()
        };

        attempt
            .retry(self.policy.backoff())
            .when(CoreError::is_transient)
            .notify(|err: &CoreError, dur| {
                tracing::warn!(counter, error = %err, retry_in = ?dur, "counter persist failed, retrying");
            })
            .call()
            .map_err(|e| CoreError::AllocationFailed(format!("counter {counter}: {e}")))
    }
}

impl SequenceAllocator for CounterAllocator {
    fn next(&self, counter: &str) -> Result<u64, CoreError> {
        let cell = self.cell(counter)?;
        let mut last = cell.lock().map_lock_err()?;

        let next = last
            .checked_add(1)
            .ok_or_else(|| CoreError::AllocationFailed(format!("counter {counter} overflowed")))?;

        // Durable before issued: the in-memory cell only advances once the
        // record is committed.
        self.persist(counter, next)?;
        *last = next;
        Ok(next)
    }

    fn current(&self, counter: &str) -> Result<u64, CoreError> {
        let txn = self.store.begin();
        Ok(txn.get_counter(counter)?.unwrap_or(0))
    }
}
