use std::collections::HashMap;
use std::sync::RwLock;

use shiftmatch_core::{AggregateId, ExpectedVersion, OrganizationScope};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    scope: OrganizationScope,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Streams {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    owners: HashMap<AggregateId, OrganizationScope>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Streams>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };

        // All events must target the same scope + aggregate stream.
        let scope = first.scope.clone();
        let aggregate_id = first.aggregate_id;
        let aggregate_type = first.aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.scope != scope {
                return Err(EventStoreError::ScopeIsolation(format!(
                    "batch contains multiple scopes (index {idx})"
                )));
            }
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        if let Some(owner) = inner.owners.get(&aggregate_id) {
            if *owner != scope {
                return Err(EventStoreError::ScopeIsolation(format!(
                    "aggregate {aggregate_id} belongs to another scope"
                )));
            }
        }

        let key = StreamKey {
            scope: scope.clone(),
            aggregate_id,
        };
        let stream = inner.streams.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        // Enforce aggregate type stability across the stream.
        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                scope: e.scope,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            committed.push(stored);
        }

        inner.owners.entry(aggregate_id).or_insert(scope);

        Ok(committed)
    }

    fn load_stream(
        &self,
        scope: &OrganizationScope,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            scope: scope.clone(),
            aggregate_id,
        };

        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    fn owner_of(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<OrganizationScope>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(inner.owners.get(&aggregate_id).cloned())
    }

    fn load_scope(&self, scope: &OrganizationScope) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        let mut events: Vec<StoredEvent> = inner
            .streams
            .iter()
            .filter(|(key, _)| key.scope == *scope)
            .flat_map(|(_, stream)| stream.iter().cloned())
            .collect();
        events.sort_by_key(|e| (e.aggregate_id, e.sequence_number));

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn scope(code: &str) -> OrganizationScope {
        OrganizationScope::new(code).unwrap()
    }

    fn event(scope: &OrganizationScope, aggregate_id: AggregateId) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            scope: scope.clone(),
            aggregate_id,
            aggregate_type: "staffing.job".to_string(),
            event_type: "staffing.job.created".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({}),
        }
    }

    #[test]
    fn append_assigns_sequence_numbers_and_records_owner() {
        let store = InMemoryEventStore::new();
        let s = scope("COMP1");
        let id = AggregateId::new();

        let committed = store
            .append(vec![event(&s, id), event(&s, id)], ExpectedVersion::Exact(0))
            .unwrap();

        assert_eq!(
            committed.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(store.owner_of(id).unwrap(), Some(s.clone()));
        assert_eq!(store.load_stream(&s, id).unwrap().len(), 2);
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let s = scope("COMP1");
        let id = AggregateId::new();
        store.append(vec![event(&s, id)], ExpectedVersion::Exact(0)).unwrap();

        let err = store.append(vec![event(&s, id)], ExpectedVersion::Exact(0)).unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn foreign_scope_cannot_append_to_owned_aggregate() {
        let store = InMemoryEventStore::new();
        let (a, b) = (scope("COMP1"), scope("COMP2"));
        let id = AggregateId::new();
        store.append(vec![event(&a, id)], ExpectedVersion::Exact(0)).unwrap();

        let err = store.append(vec![event(&b, id)], ExpectedVersion::Any).unwrap_err();
        assert!(matches!(err, EventStoreError::ScopeIsolation(_)));
        assert!(store.load_stream(&b, id).unwrap().is_empty());
    }

    #[test]
    fn load_scope_only_returns_that_scope() {
        let store = InMemoryEventStore::new();
        let (a, b) = (scope("COMP1"), scope("COMP2"));
        store.append(vec![event(&a, AggregateId::new())], ExpectedVersion::Exact(0)).unwrap();
        store.append(vec![event(&b, AggregateId::new())], ExpectedVersion::Exact(0)).unwrap();

        let events = store.load_scope(&a).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].scope, a);
    }
}
