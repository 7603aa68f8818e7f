use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value as JsonValue;

use shiftmatch_core::{JobId, OrganizationScope, ShiftSlot, WorkerId};
use shiftmatch_events::EventEnvelope;
use shiftmatch_staffing::{InvitationPolicy, JobEvent};

use crate::projections::cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
use crate::projections::{ProjectionError, should_apply};
use crate::read_model::ScopeStore;

pub const JOB_AGGREGATE_TYPE: &str = "staffing.job";

/// Queryable job read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub scope: OrganizationScope,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub slot: ShiftSlot,
    pub workers_required: u32,
    pub policy: InvitationPolicy,
    pub invited_workers: Vec<WorkerId>,
    pub workers: Vec<WorkerId>,
    /// Derived: `workers.len() >= workers_required`.
    pub job_status: bool,
}

impl JobView {
    pub fn references(&self, worker_id: WorkerId) -> bool {
        self.invited_workers.contains(&worker_id) || self.workers.contains(&worker_id)
    }

    fn recompute_status(&mut self) {
        self.job_status = self.workers.len() as u64 >= u64::from(self.workers_required);
    }
}

/// Job board projection: one `JobView` per live job. Deleted jobs are dropped.
pub struct JobBoardProjection<S, C = InMemoryCursorStore>
where
    S: ScopeStore<JobId, JobView>,
{
    store: S,
    cursors: Arc<C>,
    apply_lock: Mutex<()>,
    projection_name: String,
}

impl<S> JobBoardProjection<S>
where
    S: ScopeStore<JobId, JobView>,
{
    pub fn new(store: S) -> Self {
        Self::with_cursor_store(store, Arc::new(InMemoryCursorStore::new()))
    }
}

impl<S, C> JobBoardProjection<S, C>
where
    S: ScopeStore<JobId, JobView>,
    C: ProjectionCursorStore,
{
    pub fn with_cursor_store(store: S, cursors: Arc<C>) -> Self {
        Self {
            store,
            cursors,
            apply_lock: Mutex::new(()),
            projection_name: "staffing.job_board".to_string(),
        }
    }

    pub fn get(&self, scope: &OrganizationScope, job_id: &JobId) -> Option<JobView> {
        self.store.get(scope, job_id)
    }

    /// All live jobs of a scope, ordered by slot then title.
    pub fn list(&self, scope: &OrganizationScope) -> Vec<JobView> {
        let mut jobs = self.store.list(scope);
        jobs.sort_by(|a, b| {
            a.slot
                .cmp(&b.slot)
                .then_with(|| a.title.cmp(&b.title))
                .then(a.job_id.cmp(&b.job_id))
        });
        jobs
    }

    /// Jobs where the worker is invited or accepted.
    pub fn referencing(&self, scope: &OrganizationScope, worker_id: WorkerId) -> Vec<JobView> {
        self.list(scope)
            .into_iter()
            .filter(|j| j.references(worker_id))
            .collect()
    }

    /// Jobs the worker has accepted.
    pub fn accepted_by(&self, scope: &OrganizationScope, worker_id: WorkerId) -> Vec<JobView> {
        self.list(scope)
            .into_iter()
            .filter(|j| j.workers.contains(&worker_id))
            .collect()
    }

    /// Apply a committed envelope (non-job aggregates are ignored; replays are no-ops).
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != JOB_AGGREGATE_TYPE {
            return Ok(());
        }

        let _guard = self.apply_lock.lock().unwrap_or_else(|p| p.into_inner());

        let scope = envelope.scope();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self
            .cursors
            .get_cursor(scope, aggregate_id, &self.projection_name)
            .unwrap_or(0);
        if !should_apply(last, seq)? {
            return Ok(());
        }

        let event: JobEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        if event.scope() != scope {
            return Err(ProjectionError::ScopeIsolation(
                "event scope does not match envelope scope".to_string(),
            ));
        }
        let job_id = event.job_id();
        if job_id.aggregate_id() != aggregate_id {
            return Err(ProjectionError::ScopeIsolation(
                "event job_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            JobEvent::JobCreated(e) => {
                let mut view = JobView {
                    job_id,
                    scope: scope.clone(),
                    title: e.details.title,
                    description: e.details.description,
                    location: e.details.location,
                    slot: e.slot,
                    workers_required: e.workers_required,
                    policy: e.policy,
                    invited_workers: e.invitees,
                    workers: vec![],
                    job_status: false,
                };
                view.recompute_status();
                self.store.upsert(scope, job_id, view);
            }
            JobEvent::JobDeleted(_) => {
                self.store.remove(scope, &job_id);
            }
            other => {
                if let Some(mut view) = self.store.get(scope, &job_id) {
                    apply_to_view(&mut view, other);
                    view.recompute_status();
                    self.store.upsert(scope, job_id, view);
                }
            }
        }

        self.cursors
            .update_cursor(scope, aggregate_id, &self.projection_name, seq);

        Ok(())
    }

    /// Rebuild a scope's read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        scope: &OrganizationScope,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.store.clear_scope(scope);
        self.cursors.clear_cursors(scope, &self.projection_name);

        let mut envs: Vec<_> = envelopes
            .into_iter()
            .filter(|e| e.scope() == scope)
            .collect();
        envs.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}

fn apply_to_view(view: &mut JobView, event: JobEvent) {
    match event {
        JobEvent::WorkersInvited(e) => {
            for id in e.worker_ids {
                if !view.references(id) {
                    view.invited_workers.push(id);
                }
            }
        }
        JobEvent::InvitationAccepted(e) => {
            view.invited_workers.retain(|w| *w != e.worker_id);
            if !view.workers.contains(&e.worker_id) {
                view.workers.push(e.worker_id);
            }
        }
        JobEvent::InvitationDeclined(e) => {
            view.invited_workers.retain(|w| *w != e.worker_id);
            view.workers.retain(|w| *w != e.worker_id);
        }
        JobEvent::WorkerReleased(e) => {
            view.invited_workers.retain(|w| *w != e.worker_id);
            view.workers.retain(|w| *w != e.worker_id);
        }
        JobEvent::JobCreated(_) | JobEvent::JobDeleted(_) => {}
    }
}
