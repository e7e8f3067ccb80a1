pub mod error;
pub mod sequence;

pub use error::{CoreError, DomainViolation, LockResultExt};
pub use sequence::SequenceAllocator;
