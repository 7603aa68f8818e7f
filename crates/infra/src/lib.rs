//! Infrastructure layer: event store, command dispatch, read models,
//! projections, configuration and the activity log.

pub mod activity;
pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod retry;

pub use activity::{ActivityEntry, ActivityKind, ActivityLog, InMemoryActivityLog};
pub use command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
pub use config::EngineConfig;
pub use event_store::{
    EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent,
};
pub use projections::{
    JobBoardProjection, JobView, ProjectionError, WorkerDirectoryProjection, WorkerView,
};
pub use read_model::{InMemoryScopeStore, ScopeStore};
pub use retry::{BackoffStrategy, RetryPolicy};
