//! Organization activity log (audit entries for cascades).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shiftmatch_core::{JobId, OrganizationScope, ShiftSlot, WorkerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityKind {
    /// A worker cancelled an availability slot.
    ShiftCancelled { worker_id: WorkerId, slot: ShiftSlot },
    /// The organization deleted a worker.
    WorkerDeleted { worker_id: WorkerId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub scope: OrganizationScope,
    #[serde(flatten)]
    pub kind: ActivityKind,
    pub affected_job_count: usize,
    pub affected_jobs: Vec<JobId>,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(scope: OrganizationScope, kind: ActivityKind, affected_jobs: Vec<JobId>) -> Self {
        Self {
            id: Uuid::now_v7(),
            scope,
            kind,
            affected_job_count: affected_jobs.len(),
            affected_jobs,
            occurred_at: Utc::now(),
        }
    }
}

/// Append-only activity log, partitioned by scope.
pub trait ActivityLog: Send + Sync {
    fn record(&self, entry: ActivityEntry);

    /// Entries of a scope in recording order.
    fn list(&self, scope: &OrganizationScope) -> Vec<ActivityEntry>;
}

impl<L> ActivityLog for Arc<L>
where
    L: ActivityLog + ?Sized,
{
    fn record(&self, entry: ActivityEntry) {
        (**self).record(entry)
    }

    fn list(&self, scope: &OrganizationScope) -> Vec<ActivityEntry> {
        (**self).list(scope)
    }
}

/// In-memory activity log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryActivityLog {
    entries: RwLock<HashMap<OrganizationScope, Vec<ActivityEntry>>>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActivityLog for InMemoryActivityLog {
    fn record(&self, entry: ActivityEntry) {
        if let Ok(mut entries) = self.entries.write() {
            entries.entry(entry.scope.clone()).or_default().push(entry);
        }
    }

    fn list(&self, scope: &OrganizationScope) -> Vec<ActivityEntry> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(scope).cloned())
            .unwrap_or_default()
    }
}
