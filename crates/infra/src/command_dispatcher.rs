//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Resolve owner scope (reject cross-scope access)
//!   ↓
//! 2. Load + validate the stream, rehydrate the aggregate
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 5. Publish committed events to the bus
//! ```
//!
//! A failed append on a stale version is reported as `DispatchError::Concurrency`.
//! `dispatch_with_retry` reruns steps 1–5 on a fresh load under a `RetryPolicy`;
//! domain errors, including conflicts raised by the aggregate, are never retried.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use shiftmatch_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, OrganizationScope};
use shiftmatch_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale aggregate version). Retryable.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    /// The aggregate is owned by another scope, or the stream mixes scopes.
    #[error("scope isolation violation: {0}")]
    ScopeIsolation(String),
    /// The aggregate refused the command (deterministic, terminal).
    #[error(transparent)]
    Domain(DomainError),
    /// Historical payloads could not be decoded into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    /// The event store failed for a reason other than concurrency or isolation.
    #[error("event store error: {0}")]
    Store(EventStoreError),
    /// Every attempt allowed by the retry policy hit a version conflict.
    #[error("gave up after {attempts} conflicting attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::ScopeIsolation(msg) => DispatchError::ScopeIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        DispatchError::Domain(value)
    }
}

/// Result of a successful dispatch.
#[derive(Debug, Clone)]
pub struct Dispatched<A> {
    /// Aggregate state after the committed events were applied.
    pub aggregate: A,
    /// Committed events; empty when the command was a no-op.
    pub committed: Vec<StoredEvent>,
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the event store `S` and the bus `B`, so tests run against
/// `InMemoryEventStore` + `InMemoryEventBus`.
///
/// Publication happens strictly after a successful append. A publish failure
/// is logged and does not fail the command: the events are already durable and
/// projections are fed from the store, not from the bus.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate without issuing a command.
    ///
    /// Returns the empty aggregate from `make_aggregate` when the stream does not
    /// exist yet; `ScopeIsolation` when `scope` does not own the aggregate.
    pub fn load<A>(
        &self,
        scope: &OrganizationScope,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let (aggregate, _) = self.rehydrate(scope, aggregate_id, make_aggregate)?;
        Ok(aggregate)
    }

    /// Dispatch a command once through the full pipeline.
    pub fn dispatch<A>(
        &self,
        scope: &OrganizationScope,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: shiftmatch_events::Event + Serialize + DeserializeOwned,
    {
        let (mut aggregate, version) = self.rehydrate(scope, aggregate_id, make_aggregate)?;
        let expected = ExpectedVersion::Exact(version);

        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                aggregate,
                committed: vec![],
            });
        }

        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    scope.clone(),
                    aggregate_id,
                    aggregate_type,
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for ev in &decided {
            aggregate.apply(ev);
        }

        for stored in &committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                warn!(
                    aggregate_type,
                    %aggregate_id,
                    sequence = stored.sequence_number,
                    error = ?err,
                    "event committed but publication failed"
                );
            }
        }

        Ok(Dispatched { aggregate, committed })
    }

    /// Dispatch with a bounded retry on version conflicts.
    ///
    /// Each attempt reloads the stream and re-decides the command on the fresh
    /// state. Returns `RetriesExhausted` once the policy's budget is spent.
    pub fn dispatch_with_retry<A>(
        &self,
        policy: &RetryPolicy,
        scope: &OrganizationScope,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: shiftmatch_events::Event + Serialize + DeserializeOwned,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.dispatch(scope, aggregate_id, aggregate_type, command, &make_aggregate) {
                Err(DispatchError::Concurrency(msg)) => {
                    if !policy.should_retry(attempt) {
                        return Err(DispatchError::RetriesExhausted {
                            attempts: attempt,
                            last: msg,
                        });
                    }
                    let delay = policy.delay_for_attempt(attempt);
                    debug!(
                        aggregate_type,
                        %aggregate_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "version conflict, retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                other => return other,
            }
        }
    }

    fn rehydrate<A>(
        &self,
        scope: &OrganizationScope,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<(A, u64), DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        if let Some(owner) = self.store.owner_of(aggregate_id)? {
            if owner != *scope {
                return Err(DispatchError::ScopeIsolation(format!(
                    "aggregate {aggregate_id} is not owned by scope {scope}"
                )));
            }
        }

        let history = self.store.load_stream(scope, aggregate_id)?;
        validate_loaded_stream(scope, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        Ok((aggregate, stream_version(&history)))
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    scope: &OrganizationScope,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.scope != *scope {
            return Err(DispatchError::ScopeIsolation(format!(
                "loaded stream contains wrong scope at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::ScopeIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
