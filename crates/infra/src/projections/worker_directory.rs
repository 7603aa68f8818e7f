use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value as JsonValue;

use shiftmatch_core::{JobId, OrganizationScope, ShiftSlot, WorkerId};
use shiftmatch_events::EventEnvelope;
use shiftmatch_workforce::WorkerEvent;

use crate::projections::cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
use crate::projections::{ProjectionError, should_apply};
use crate::read_model::ScopeStore;

pub const WORKER_AGGREGATE_TYPE: &str = "workforce.worker";

/// Queryable worker read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerView {
    pub worker_id: WorkerId,
    pub scope: OrganizationScope,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub approved: bool,
    pub availability: Vec<ShiftSlot>,
    pub invited_jobs: Vec<JobId>,
    pub push_token: Option<String>,
}

impl WorkerView {
    pub fn is_available_for(&self, slot: &ShiftSlot) -> bool {
        self.availability.contains(slot)
    }
}

/// Worker directory projection.
///
/// Maintains one `WorkerView` per live worker. Removed workers are dropped
/// from the read model.
pub struct WorkerDirectoryProjection<S, C = InMemoryCursorStore>
where
    S: ScopeStore<WorkerId, WorkerView>,
{
    store: S,
    cursors: Arc<C>,
    apply_lock: Mutex<()>,
    projection_name: String,
}

impl<S> WorkerDirectoryProjection<S>
where
    S: ScopeStore<WorkerId, WorkerView>,
{
    pub fn new(store: S) -> Self {
        Self::with_cursor_store(store, Arc::new(InMemoryCursorStore::new()))
    }
}

impl<S, C> WorkerDirectoryProjection<S, C>
where
    S: ScopeStore<WorkerId, WorkerView>,
    C: ProjectionCursorStore,
{
    pub fn with_cursor_store(store: S, cursors: Arc<C>) -> Self {
        Self {
            store,
            cursors,
            apply_lock: Mutex::new(()),
            projection_name: "workforce.directory".to_string(),
        }
    }

    pub fn get(&self, scope: &OrganizationScope, worker_id: &WorkerId) -> Option<WorkerView> {
        self.store.get(scope, worker_id)
    }

    /// All live workers of a scope, ordered by name then id.
    pub fn list(&self, scope: &OrganizationScope) -> Vec<WorkerView> {
        let mut workers = self.store.list(scope);
        workers.sort_by(|a, b| a.name.cmp(&b.name).then(a.worker_id.cmp(&b.worker_id)));
        workers
    }

    pub fn approved(&self, scope: &OrganizationScope) -> Vec<WorkerView> {
        self.list(scope).into_iter().filter(|w| w.approved).collect()
    }

    pub fn pending(&self, scope: &OrganizationScope) -> Vec<WorkerView> {
        self.list(scope).into_iter().filter(|w| !w.approved).collect()
    }

    /// Approved workers with a slot equal to `slot`.
    pub fn available_for(&self, scope: &OrganizationScope, slot: &ShiftSlot) -> Vec<WorkerView> {
        self.list(scope)
            .into_iter()
            .filter(|w| w.approved && w.is_available_for(slot))
            .collect()
    }

    /// Case-insensitive e-mail lookup.
    pub fn find_by_email(&self, scope: &OrganizationScope, email: &str) -> Option<WorkerView> {
        let needle = email.trim().to_lowercase();
        self.store
            .list(scope)
            .into_iter()
            .find(|w| w.email.to_lowercase() == needle)
    }

    /// Apply a committed envelope.
    ///
    /// - Ignores non-worker aggregates (allows sharing a feed across modules)
    /// - Enforces scope isolation
    /// - Enforces monotonic sequence per (scope, aggregate) stream
    /// - Idempotent: replays <= cursor are ignored
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != WORKER_AGGREGATE_TYPE {
            return Ok(());
        }

        // Cursor check and apply must not interleave across threads.
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

        let event: WorkerEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        if event.scope() != scope {
            return Err(ProjectionError::ScopeIsolation(
                "event scope does not match envelope scope".to_string(),
            ));
        }
        let worker_id = event.worker_id();
        if worker_id.aggregate_id() != aggregate_id {
            return Err(ProjectionError::ScopeIsolation(
                "event worker_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            WorkerEvent::WorkerRegistered(e) => {
                self.store.upsert(
                    scope,
                    worker_id,
                    WorkerView {
                        worker_id,
                        scope: scope.clone(),
                        name: e.profile.name,
                        email: e.profile.email,
                        phone: e.profile.phone,
                        role: e.profile.role,
                        department: e.profile.department,
                        approved: false,
                        availability: vec![],
                        invited_jobs: vec![],
                        push_token: None,
                    },
                );
            }
            WorkerEvent::WorkerRemoved(_) => {
                self.store.remove(scope, &worker_id);
            }
            other => {
                if let Some(mut view) = self.store.get(scope, &worker_id) {
                    apply_to_view(&mut view, other);
                    self.store.upsert(scope, worker_id, view);
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

fn apply_to_view(view: &mut WorkerView, event: WorkerEvent) {
    match event {
        WorkerEvent::WorkerApproved(_) => view.approved = true,
        WorkerEvent::AvailabilityAdded(e) => {
            if !view.availability.contains(&e.slot) {
                view.availability.push(e.slot);
            }
        }
        WorkerEvent::AvailabilityCancelled(e) => {
            view.availability.retain(|s| *s != e.slot);
            view.invited_jobs.retain(|j| !e.released_jobs.contains(j));
        }
        WorkerEvent::InvitationRecorded(e) => {
            if !view.invited_jobs.contains(&e.job_id) {
                view.invited_jobs.push(e.job_id);
            }
        }
        WorkerEvent::InvitationCleared(e) => view.invited_jobs.retain(|j| *j != e.job_id),
        WorkerEvent::ProfileUpdated(e) => {
            view.name = e.profile.name;
            view.email = e.profile.email;
            view.phone = e.profile.phone;
            view.role = e.profile.role;
            view.department = e.profile.department;
        }
        WorkerEvent::PushTokenSet(e) => view.push_token = Some(e.token),
        // Placements are read from the job board.
        WorkerEvent::PlacementReserved(_) | WorkerEvent::PlacementReleased(_) => {}
        WorkerEvent::WorkerRegistered(_) | WorkerEvent::WorkerRemoved(_) => {}
    }
}
