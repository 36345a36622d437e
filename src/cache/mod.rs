//! Caching primitives.
//!
//! [`BoundedCache`] is the backing store of every
//! [`EntityManager`](crate::manager::EntityManager): an insertion-ordered map
//! with an optional size cap and deterministic FIFO eviction. It doubles as
//! the ordered map returned by bulk fetches and accumulated by
//! [`Collector`](crate::collector::Collector)s.

mod bounded;

pub use bounded::BoundedCache;
