//! Projection cursor (checkpoint) tracking.
//!
//! A cursor is the last applied `sequence_number` per (scope, aggregate,
//! projection). It makes projections idempotent under at-least-once delivery
//! (replays <= cursor are ignored) and is cleared before a rebuild.

use std::collections::HashMap;
use std::sync::RwLock;

use shiftmatch_core::{AggregateId, OrganizationScope};

/// Projection cursor store.
pub trait ProjectionCursorStore: Send + Sync {
    /// Last processed sequence number of a stream, if any.
    fn get_cursor(
        &self,
        scope: &OrganizationScope,
        aggregate_id: AggregateId,
        projection_name: &str,
    ) -> Option<u64>;

    fn update_cursor(
        &self,
        scope: &OrganizationScope,
        aggregate_id: AggregateId,
        projection_name: &str,
        sequence_number: u64,
    );

    /// Clear all cursors for a scope + projection (for rebuilds).
    fn clear_cursors(&self, scope: &OrganizationScope, projection_name: &str);
}

type CursorKey = (OrganizationScope, AggregateId, String);

/// In-memory cursor store.
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectionCursorStore for InMemoryCursorStore {
    fn get_cursor(
        &self,
        scope: &OrganizationScope,
        aggregate_id: AggregateId,
        projection_name: &str,
    ) -> Option<u64> {
        let cursors = self.cursors.read().ok()?;
        cursors
            .get(&(scope.clone(), aggregate_id, projection_name.to_string()))
            .copied()
    }

    fn update_cursor(
        &self,
        scope: &OrganizationScope,
        aggregate_id: AggregateId,
        projection_name: &str,
        sequence_number: u64,
    ) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                (scope.clone(), aggregate_id, projection_name.to_string()),
                sequence_number,
            );
        }
    }

    fn clear_cursors(&self, scope: &OrganizationScope, projection_name: &str) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|(s, _, name), _| !(s == scope && name == projection_name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clearing_one_projection_keeps_the_others() {
        let store = InMemoryCursorStore::new();
        let scope = OrganizationScope::new("COMP1").unwrap();
        let id = AggregateId::new();

        store.update_cursor(&scope, id, "workforce.directory", 3);
        store.update_cursor(&scope, id, "staffing.job_board", 5);
        store.clear_cursors(&scope, "workforce.directory");

        assert_eq!(store.get_cursor(&scope, id, "workforce.directory"), None);
        assert_eq!(store.get_cursor(&scope, id, "staffing.job_board"), Some(5));
    }
}
