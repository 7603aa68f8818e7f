use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shiftmatch_core::{AggregateId, OrganizationScope};

/// Envelope for an event, carrying the organization scope and stream metadata.
///
/// This is the unit published on the bus and fed into read-model projections.
///
/// Notes:
/// - **Scope isolation** is enforced here via `scope`.
/// - `sequence_number` is monotonically increasing per `(scope, aggregate_id)` stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    scope: OrganizationScope,

    aggregate_id: AggregateId,
    aggregate_type: String,

    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        scope: OrganizationScope,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            scope,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn scope(&self) -> &OrganizationScope {
        &self.scope
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
