//! Transactional core of a pet-adoption backend: a durable sequence
//! allocator, a snapshot-transaction coordinator with bounded retry, and the
//! domain operations (registration, reservations, adoptions) built on them.

pub mod contracts;
pub mod domain;
pub mod store;
