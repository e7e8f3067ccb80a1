//! Shared retry policy and transient-error classification.

use std::time::Duration;

use backon::ConstantBuilder;

/// Retry rule for transient store conflicts: bounded attempts, fixed delay.
///
/// One instance is shared by the transaction coordinator and the counter
/// allocator so every retry site follows the same rule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Fixed delay between attempts in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 25,
        }
    }
}

impl RetryPolicy {
    /// Creates a RetryPolicy from environment variables.
    ///
    /// Environment variables:
    /// - `PAWBASE_TXN_MAX_RETRIES`: retries after the first attempt (default: 3)
    /// - `PAWBASE_TXN_RETRY_DELAY_MS`: fixed inter-attempt delay in ms (default: 25)
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_retries: std::env::var("PAWBASE_TXN_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_retries),
            delay_ms: std::env::var("PAWBASE_TXN_RETRY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.delay_ms),
        }
    }

    /// Creates a constant (fixed-delay) backoff builder.
    pub fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(Duration::from_millis(self.delay_ms))
            .with_max_times(self.max_retries)
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }
}

/// Classifies store error kinds as transient (retryable) or hard.
///
/// Transient kinds are the ones the store raises for commit-time write
/// conflicts, lock timeouts and aborted transactions. Constraint and domain
/// violations never come through here as transient; retrying them would turn
/// a duplicate-key failure into spurious retries.
pub fn is_transient_kind(kind: rocksdb::ErrorKind) -> bool {
    matches!(
        kind,
        rocksdb::ErrorKind::Busy
            | rocksdb::ErrorKind::TryAgain
            | rocksdb::ErrorKind::TimedOut
            | rocksdb::ErrorKind::Aborted
    )
}
