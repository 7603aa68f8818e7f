//! Scope-isolated read model storage abstractions.

pub mod scope_store;

pub use scope_store::{InMemoryScopeStore, ScopeStore};
