//! Append-only event store boundary.
//!
//! Stores and loads scope-partitioned event streams without making any
//! storage assumptions.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
