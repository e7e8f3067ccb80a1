use std::sync::Arc;

use backon::BlockingRetryable;

use crate::contracts::CoreError;
use crate::store::docstore::{DocStore, Txn};
use crate::store::retry::RetryPolicy;

/// Runs units of work as all-or-nothing snapshot transactions.
///
/// The closure is executed exactly once per attempt. When the store reports
/// a transient conflict, the whole closure is re-run from scratch under the
/// shared retry policy; a failed commit is retried the same way. Domain and
/// other non-transient errors abort immediately and propagate unchanged. On
/// exhaustion the caller gets `OperationFailed` and must treat the operation
/// as not applied.
pub struct TxnCoordinator {
    store: Arc<DocStore>,
    policy: RetryPolicy,
}

impl TxnCoordinator {
    pub fn new(store: Arc<DocStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `work` inside a transaction and commits it.
    ///
    /// If this returns `Ok`, every write made by the closure is durably and
    /// atomically visible; on `Err`, none of them are.
    pub fn run_in_transaction<T, F>(&self, mut work: F) -> Result<T, CoreError>
    where
        F: FnMut(&Txn<'_>) -> Result<T, CoreError>,
    {
        let attempt = || {
            let txn = self.store.begin();
            let value = work(&txn)?;
            // An error path drops the transaction, discarding its writes.
            txn.commit()?;
            Ok(value)
        };

        attempt
            .retry(self.policy.backoff())
            .when(CoreError::is_transient)
            .notify(|err: &CoreError, dur| {
                tracing::warn!(error = %err, retry_in = ?dur, "transient conflict, retrying transaction");
            })
            .call()
            .map_err(|err| {
                if err.is_transient() {
                    CoreError::OperationFailed {
                        attempts: self.policy.max_attempts(),
                        last: err.to_string(),
                    }
                } else {
                    err
                }
            })
    }
}
