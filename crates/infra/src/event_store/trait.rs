use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use shiftmatch_core::{AggregateId, ExpectedVersion, OrganizationScope};
use std::sync::Arc;

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// ## Event Lifecycle
///
/// 1. **Domain event**: produced by an aggregate's `handle()`
/// 2. **UncommittedEvent**: wrapped with stream metadata (scope, aggregate id, type)
/// 3. **StoredEvent**: persisted with an assigned `sequence_number`
/// 4. **EventEnvelope**: published to the bus and fed into projections
///
/// Use `UncommittedEvent::from_typed()` to build one from a typed domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub scope: OrganizationScope,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream.
///
/// Sequence numbers start at 1, are per stream `(scope, aggregate_id)`, and never
/// change once assigned. The last sequence number of a stream is the version
/// of the aggregate it rehydrates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub scope: OrganizationScope,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into a scoped envelope for publication/projection.
    pub fn to_envelope(&self) -> shiftmatch_events::EventEnvelope<JsonValue> {
        shiftmatch_events::EventEnvelope::new(
            self.event_id,
            self.scope.clone(),
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

/// Event store operation error.
///
/// Infrastructure errors (storage, concurrency, isolation) as opposed to
/// domain errors (validation, business rules).
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The stream moved past the expected version. Retryable.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// An aggregate was addressed under a scope that does not own it.
    #[error("scope isolation violation: {0}")]
    ScopeIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),
}

/// Append-only, scope-partitioned event store.
///
/// One stream per aggregate instance, keyed by `(scope, aggregate_id)`. An
/// aggregate id belongs to exactly one scope: the scope of its first append.
///
/// `append()`:
/// - requires every event of the batch to target the same scope and aggregate
/// - rejects appends to an aggregate owned by another scope
/// - checks `ExpectedVersion` against the current stream version
/// - assigns sequence numbers starting at `current_version + 1`
/// - persists the whole batch or nothing
///
/// `load_stream()` returns the events in sequence order, or an empty vector if
/// the stream does not exist.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for a scope + aggregate.
    fn load_stream(
        &self,
        scope: &OrganizationScope,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Scope that owns `aggregate_id`, if the aggregate has any events.
    fn owner_of(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<OrganizationScope>, EventStoreError>;

    /// Every event of a scope, ordered by aggregate then sequence (rebuild support).
    fn load_scope(&self, scope: &OrganizationScope) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(
        &self,
        scope: &OrganizationScope,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(scope, aggregate_id)
    }

    fn owner_of(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<OrganizationScope>, EventStoreError> {
        (**self).owner_of(aggregate_id)
    }

    fn load_scope(&self, scope: &OrganizationScope) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_scope(scope)
    }
}

impl UncommittedEvent {
    /// Build an uncommitted event from a typed domain event.
    pub fn from_typed<E>(
        scope: OrganizationScope,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: shiftmatch_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            scope,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}
