use std::sync::{MutexGuard, PoisonError};

use thiserror::Error;

/// Errors surfaced by the transactional core.
///
/// Only `TransientConflict` is recovered locally (by retry); everything else
/// propagates unchanged to the caller of the domain operation.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Store-reported write/commit conflict. Retried by the coordinator;
    /// callers only see it wrapped as `OperationFailed` after exhaustion.
    #[error("transient conflict: {0}")]
    TransientConflict(String),

    /// Retries exhausted; the operation was not applied.
    #[error("operation failed after {attempts} attempts: {last}")]
    OperationFailed { attempts: usize, last: String },

    /// Counter increment could not complete; fatal to the enclosing operation.
    #[error("sequence allocation failed: {0}")]
    AllocationFailed(String),

    /// Business-rule failure. Never retried, surfaced verbatim.
    #[error(transparent)]
    Domain(#[from] DomainViolation),

    /// Store could not be opened or reached.
    #[error("store connection failed: {0}")]
    ConnectionFailure(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// True for errors that may succeed if the whole attempt is re-run.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::TransientConflict(_))
    }
}

/// Domain-rule violations, mapped by the consuming layer to 4xx responses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainViolation {
    #[error("username already exists: {0}")]
    UsernameTaken(String),

    #[error("pet {0} is not available for adoption")]
    PetNotAvailable(u64),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("user {0} does not have admin privileges")]
    NotAdmin(u64),

    #[error("pet {pet_id} is already in favourites for user {user_id}")]
    AlreadyFavourited { user_id: u64, pet_id: u64 },

    #[error("pet {pet_id} is already in the cart for user {user_id}")]
    AlreadyInCart { user_id: u64, pet_id: u64 },

    #[error("pet {pet_id} is not in the cart for user {user_id}")]
    NotInCart { user_id: u64, pet_id: u64 },

    #[error("application {0} is not pending")]
    ApplicationNotOpen(u64),

    #[error("reservation contains no pets")]
    EmptyReservation,

    #[error("application {0} cannot be moved back to pending")]
    InvalidStatusChange(u64),
}

/// Extension trait for converting mutex poison errors to `CoreError`.
pub trait LockResultExt<T> {
    /// Converts a lock error to an `AllocationFailed` error.
    fn map_lock_err(self) -> Result<T, CoreError>;
}

impl<'a, T> LockResultExt<MutexGuard<'a, T>>
    for Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<MutexGuard<'a, T>, CoreError> {
        self.map_err(|e| CoreError::AllocationFailed(format!("counter lock poisoned: {e}")))
    }
}
