mod coordinator;
mod docstore;
mod retry;
mod sequence;

pub use coordinator::TxnCoordinator;
pub use docstore::{DocStore, Txn};
pub use retry::{is_transient_kind, RetryPolicy};
pub use sequence::CounterAllocator;
