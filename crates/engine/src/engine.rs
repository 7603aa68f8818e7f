//! The matching engine: every staffing operation, scope-checked.
//!
//! ```text
//! operation(ActorScope, ..)
//!   ↓
//! 1. Resolve the caller's scope (missing → Unauthorized)
//!   ↓
//! 2. Validate input and load the entities involved
//!   ↓
//! 3. Dispatch one command per entity (optimistic, retried on version conflicts)
//!   ↓
//! 4. Feed the committed stream into the worker directory and job board
//!   ↓
//! 5. Record activity / owe notifications
//! ```
//!
//! Each worker and each job is its own unit of serialization. Operations that
//! touch several entities update them one by one; there is no cross-entity
//! lock. Where a worker and a job must agree, the worker stream goes first:
//!
//! - an acceptance reserves a placement on the worker, then commits on the
//!   job, then checks the placement survived;
//! - a cascade commits on the worker, which names every job it held, then
//!   releases the worker from those jobs.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, error, info, warn};

use shiftmatch_core::{AggregateId, JobId, OrganizationScope, Rejection, ShiftSlot, WorkerId};
use shiftmatch_events::{EventBus, EventEnvelope, InMemoryEventBus};
use shiftmatch_infra::projections::job_board::JOB_AGGREGATE_TYPE;
use shiftmatch_infra::projections::worker_directory::WORKER_AGGREGATE_TYPE;
use shiftmatch_infra::{
    ActivityEntry, ActivityKind, ActivityLog, CommandDispatcher, DispatchError, Dispatched,
    EngineConfig, EventStore, InMemoryActivityLog, InMemoryEventStore, InMemoryScopeStore,
    JobBoardProjection, JobView, StoredEvent, WorkerDirectoryProjection, WorkerView,
};
use shiftmatch_staffing::{
    AcceptInvitation, Candidate, CreateJob, DeclineInvitation, DeleteJob, InviteWorkers, Job,
    JobCommand, JobDetails, JobEvent, ReleaseReason, ReleaseWorker, select_invitees,
};
use shiftmatch_workforce::{
    AddAvailability, ApproveWorker, CancelAvailability, ClearInvitation, RecordInvitation,
    RegisterWorker, ReleasePlacement, RemoveWorker, ReservePlacement, SetPushToken, UpdateProfile,
    Worker, WorkerCommand, WorkerEvent,
};

use crate::context::ActorScope;
use crate::dto::{
    CascadeReport, InvitationResponse, NewJob, NewWorker, WorkerSchedule, WorkerUpdate,
};
use crate::error::MatchError;
use crate::notify::{Notification, NotificationDispatcher, Recipient, TemplateKind};

pub type EnvelopeBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

type WorkerDirectory = WorkerDirectoryProjection<InMemoryScopeStore<WorkerId, WorkerView>>;
type JobBoard = JobBoardProjection<InMemoryScopeStore<JobId, JobView>>;

pub struct MatchingEngine<S = Arc<InMemoryEventStore>, B = Arc<EnvelopeBus>> {
    dispatcher: CommandDispatcher<S, B>,
    workers: WorkerDirectory,
    jobs: JobBoard,
    notifier: Arc<dyn NotificationDispatcher>,
    activity: Arc<dyn ActivityLog>,
    config: EngineConfig,
    // Serializes e-mail uniqueness checks with the appends that set an e-mail.
    email_guard: Mutex<()>,
}

impl MatchingEngine {
    /// Engine over an in-memory store, bus and activity log.
    pub fn in_memory(config: EngineConfig, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryEventStore::new()),
            Arc::new(EnvelopeBus::new()),
            notifier,
            Arc::new(InMemoryActivityLog::new()),
        )
    }
}

impl<S, B> MatchingEngine<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        config: EngineConfig,
        store: S,
        bus: B,
        notifier: Arc<dyn NotificationDispatcher>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            workers: WorkerDirectoryProjection::new(InMemoryScopeStore::new()),
            jobs: JobBoardProjection::new(InMemoryScopeStore::new()),
            notifier,
            activity,
            config,
            email_guard: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        self.dispatcher.store()
    }

    /// Bus carrying every committed envelope.
    pub fn bus(&self) -> &B {
        self.dispatcher.bus()
    }

    // -------------------------
    // Workers
    // -------------------------

    /// Register an unapproved worker. E-mails are unique per scope.
    pub fn register_worker(
        &self,
        actor: &ActorScope,
        new_worker: NewWorker,
    ) -> Result<WorkerView, MatchError> {
        let scope = actor.scope()?;
        let _guard = self.email_guard.lock().unwrap_or_else(|p| p.into_inner());

        self.ensure_email_free(scope, &new_worker.email, None)?;

        let worker_id = WorkerId::new();
        let command = WorkerCommand::RegisterWorker(RegisterWorker {
            scope: scope.clone(),
            worker_id,
            profile: new_worker.into(),
            occurred_at: Utc::now(),
        });
        self.dispatch_worker(scope, worker_id, &command)?;

        info!(scope = %scope, %worker_id, "worker registered");
        self.worker_view(scope, worker_id)
    }

    /// Edit contact and HR details. A changed e-mail must stay unique.
    pub fn update_worker_profile(
        &self,
        actor: &ActorScope,
        worker_id: WorkerId,
        update: WorkerUpdate,
    ) -> Result<WorkerView, MatchError> {
        let scope = actor.scope()?;
        let _guard = self.email_guard.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(email) = &update.email {
            self.ensure_email_free(scope, email, Some(worker_id))?;
        }

        let command = WorkerCommand::UpdateProfile(UpdateProfile {
            scope: scope.clone(),
            worker_id,
            changes: update.into(),
            occurred_at: Utc::now(),
        });
        let updated = self.dispatch_worker(scope, worker_id, &command)?;

        info!(
            scope = %scope,
            %worker_id,
            changed = !updated.committed.is_empty(),
            "worker profile updated"
        );
        self.worker_view(scope, worker_id)
    }

    pub fn approve_worker(
        &self,
        actor: &ActorScope,
        worker_id: WorkerId,
    ) -> Result<WorkerView, MatchError> {
        let scope = actor.scope()?;
        let command = WorkerCommand::ApproveWorker(ApproveWorker {
            scope: scope.clone(),
            worker_id,
            occurred_at: Utc::now(),
        });
        let approved = self.dispatch_worker(scope, worker_id, &command)?;

        info!(scope = %scope, %worker_id, "worker approved");
        self.notify(Notification {
            recipient: worker_recipient(&approved.aggregate),
            kind: TemplateKind::Approved,
            payload: json!({
                "worker_id": worker_id,
                "name": approved.aggregate.profile().name,
            }),
        });

        self.worker_view(scope, worker_id)
    }

    /// Add a `(date, shift)` slot. Adding an existing slot changes nothing.
    pub fn add_availability(
        &self,
        actor: &ActorScope,
        worker_id: WorkerId,
        date: &str,
        shift: &str,
    ) -> Result<WorkerView, MatchError> {
        let scope = actor.scope()?;
        let slot = ShiftSlot::parse(date, shift)?;

        let command = WorkerCommand::AddAvailability(AddAvailability {
            scope: scope.clone(),
            worker_id,
            slot,
            occurred_at: Utc::now(),
        });
        let added = self.dispatch_worker(scope, worker_id, &command)?;
        debug!(
            scope = %scope,
            %worker_id,
            %slot,
            added = !added.committed.is_empty(),
            "availability added"
        );

        self.worker_view(scope, worker_id)
    }

    pub fn set_push_token(
        &self,
        actor: &ActorScope,
        worker_id: WorkerId,
        token: &str,
    ) -> Result<WorkerView, MatchError> {
        let scope = actor.scope()?;
        let command = WorkerCommand::SetPushToken(SetPushToken {
            scope: scope.clone(),
            worker_id,
            token: token.trim().to_string(),
            occurred_at: Utc::now(),
        });
        self.dispatch_worker(scope, worker_id, &command)?;
        self.worker_view(scope, worker_id)
    }

    /// Approved workers whose availability contains `(date, shift)`.
    pub fn workers_for_shift(
        &self,
        actor: &ActorScope,
        date: &str,
        shift: &str,
    ) -> Result<Vec<WorkerView>, MatchError> {
        let scope = actor.scope()?;
        let slot = ShiftSlot::parse(date, shift)?;
        Ok(self.workers.available_for(scope, &slot))
    }

    pub fn pending_workers(&self, actor: &ActorScope) -> Result<Vec<WorkerView>, MatchError> {
        Ok(self.workers.pending(actor.scope()?))
    }

    pub fn approved_workers(&self, actor: &ActorScope) -> Result<Vec<WorkerView>, MatchError> {
        Ok(self.workers.approved(actor.scope()?))
    }

    pub fn get_worker(
        &self,
        actor: &ActorScope,
        worker_id: WorkerId,
    ) -> Result<WorkerView, MatchError> {
        let scope = actor.scope()?;
        self.ensure_owned(scope, worker_id.aggregate_id(), MatchError::WorkerNotFound)?;
        self.worker_view(scope, worker_id)
    }

    pub fn worker_schedule(
        &self,
        actor: &ActorScope,
        worker_id: WorkerId,
    ) -> Result<WorkerSchedule, MatchError> {
        let worker = self.get_worker(actor, worker_id)?;
        let scope = &worker.scope;

        let invited_jobs = worker
            .invited_jobs
            .iter()
            .filter_map(|job_id| self.jobs.get(scope, job_id))
            .collect();

        Ok(WorkerSchedule {
            worker_id,
            availability: worker.availability.clone(),
            invited_jobs,
            accepted_jobs: self.jobs.accepted_by(scope, worker_id),
        })
    }

    // -------------------------
    // Jobs
    // -------------------------

    /// Post a job and invite its initial candidates.
    ///
    /// Approved workers available for the slot are invited; when there are
    /// none, every approved worker is (unless broadcasting is disabled).
    pub fn create_job(&self, actor: &ActorScope, new_job: NewJob) -> Result<JobView, MatchError> {
        let scope = actor.scope()?;
        let slot = ShiftSlot::parse(&new_job.date, &new_job.shift)?;

        let approved = self.workers.approved(scope);
        let selection = select_invitees(
            &slot,
            approved.iter().map(|w| Candidate {
                worker_id: w.worker_id,
                availability: &w.availability,
            }),
            self.config.broadcast_when_unavailable,
        );
        debug!(
            scope = %scope,
            %slot,
            policy = selection.policy.as_str(),
            approved = approved.len(),
            invitees = selection.invitees.len(),
            "invitation candidates selected"
        );

        let job_id = JobId::new();
        let command = JobCommand::CreateJob(CreateJob {
            scope: scope.clone(),
            job_id,
            details: JobDetails {
                title: new_job.title,
                description: new_job.description,
                location: new_job.location,
            },
            slot,
            workers_required: new_job.workers_required,
            invitees: selection.invitees,
            policy: selection.policy,
            occurred_at: Utc::now(),
        });
        let created = self.dispatch_job(scope, job_id, &command)?;

        let invitees = created.aggregate.invited_workers().to_vec();
        self.deliver_invitations(scope, &created.aggregate, &invitees);

        info!(
            scope = %scope,
            %job_id,
            %slot,
            workers_required = created.aggregate.workers_required(),
            invited = invitees.len(),
            "job created"
        );
        self.job_view(scope, job_id)
    }

    /// Invite more workers to an open job.
    ///
    /// Every id must name an approved worker of the caller's scope. Workers
    /// already invited to or accepted on the job are skipped.
    pub fn invite_workers(
        &self,
        actor: &ActorScope,
        job_id: JobId,
        worker_ids: &[WorkerId],
    ) -> Result<JobView, MatchError> {
        let scope = actor.scope()?;
        self.load_job(scope, job_id)?;

        for &worker_id in worker_ids {
            let worker = self.load_worker(scope, worker_id)?;
            if !worker.is_approved() {
                return Err(Rejection::WorkerNotApproved.into());
            }
        }

        let command = JobCommand::InviteWorkers(InviteWorkers {
            scope: scope.clone(),
            job_id,
            worker_ids: worker_ids.to_vec(),
            occurred_at: Utc::now(),
        });
        let invited = self.dispatch_job(scope, job_id, &command)?;

        let pending: Vec<WorkerId> = worker_ids
            .iter()
            .copied()
            .filter(|id| invited.aggregate.invited_workers().contains(id))
            .collect();
        self.deliver_invitations(scope, &invited.aggregate, &pending);

        info!(scope = %scope, %job_id, requested = worker_ids.len(), "workers invited");
        self.job_view(scope, job_id)
    }

    /// Accept or decline an invitation on behalf of a worker.
    pub fn respond_to_invitation(
        &self,
        actor: &ActorScope,
        job_id: JobId,
        worker_id: WorkerId,
        response: InvitationResponse,
    ) -> Result<JobView, MatchError> {
        let scope = actor.scope()?;

        let outcome = match response {
            InvitationResponse::Accept => self.accept(scope, job_id, worker_id),
            InvitationResponse::Decline => self.decline(scope, job_id, worker_id),
        };
        let answered = outcome.inspect_err(|err| {
            debug!(
                scope = %scope,
                %job_id,
                %worker_id,
                response = response.as_str(),
                code = err.code(),
                "invitation response refused"
            );
        })?;

        // The job side is committed; the worker's listing is best effort.
        self.forget_invitation(scope, worker_id, job_id);

        info!(
            scope = %scope,
            %job_id,
            %worker_id,
            response = response.as_str(),
            accepted = answered.aggregate.workers().len(),
            filled = answered.aggregate.is_filled(),
            "invitation answered"
        );
        self.job_view(scope, job_id)
    }

    /// Organization-initiated removal of a worker from one job.
    pub fn remove_worker_from_job(
        &self,
        actor: &ActorScope,
        job_id: JobId,
        worker_id: WorkerId,
    ) -> Result<JobView, MatchError> {
        let scope = actor.scope()?;
        let released =
            self.release(scope, job_id, worker_id, ReleaseReason::RemovedByOrganization)?;
        self.forget_invitation(scope, worker_id, job_id);
        self.forget_placement(scope, worker_id, job_id);

        info!(
            scope = %scope,
            %job_id,
            %worker_id,
            removed = !released.committed.is_empty(),
            filled = released.aggregate.is_filled(),
            "worker removed from job"
        );
        self.job_view(scope, job_id)
    }

    /// Delete a job and withdraw its invitations and placements.
    pub fn delete_job(&self, actor: &ActorScope, job_id: JobId) -> Result<(), MatchError> {
        let scope = actor.scope()?;
        let command = JobCommand::DeleteJob(DeleteJob {
            scope: scope.clone(),
            job_id,
            occurred_at: Utc::now(),
        });
        let deleted = self.dispatch_job(scope, job_id, &command)?;

        let mut withdrawn = 0;
        for event in decoded::<JobEvent>(&deleted.committed) {
            if let JobEvent::JobDeleted(e) = event {
                for &worker_id in &e.invitees {
                    self.forget_invitation(scope, worker_id, job_id);
                }
                for &worker_id in &e.workers {
                    self.forget_placement(scope, worker_id, job_id);
                }
                withdrawn += e.invitees.len() + e.workers.len();
            }
        }

        info!(scope = %scope, %job_id, withdrawn, "job deleted");
        Ok(())
    }

    pub fn get_job(&self, actor: &ActorScope, job_id: JobId) -> Result<JobView, MatchError> {
        let scope = actor.scope()?;
        self.ensure_owned(scope, job_id.aggregate_id(), MatchError::JobNotFound)?;
        self.job_view(scope, job_id)
    }

    pub fn jobs_for_scope(&self, actor: &ActorScope) -> Result<Vec<JobView>, MatchError> {
        Ok(self.jobs.list(actor.scope()?))
    }

    // -------------------------
    // Cascades
    // -------------------------

    /// Cancel one availability slot and release the worker from every job on it.
    pub fn cancel_worker_shift(
        &self,
        actor: &ActorScope,
        worker_id: WorkerId,
        date: &str,
        shift: &str,
    ) -> Result<CascadeReport, MatchError> {
        let scope = actor.scope()?;
        let slot = ShiftSlot::parse(date, shift)?;
        let worker = self.load_worker(scope, worker_id)?;
        if !worker.is_available_for(&slot) {
            return Err(Rejection::SlotNotFound.into());
        }

        let command = WorkerCommand::CancelAvailability(CancelAvailability {
            scope: scope.clone(),
            worker_id,
            slot,
            released_jobs: self.jobs_touching(scope, &worker, Some(slot)),
            occurred_at: Utc::now(),
        });
        let cancelled = self.dispatch_worker(scope, worker_id, &command)?;
        let affected = self.release_all(
            scope,
            worker_id,
            &released_jobs(&cancelled.committed),
            ReleaseReason::ShiftCancelled,
        )?;

        let report = CascadeReport::new(affected);
        self.activity.record(ActivityEntry::new(
            scope.clone(),
            ActivityKind::ShiftCancelled { worker_id, slot },
            report.affected_jobs.clone(),
        ));
        self.notify(Notification {
            recipient: Recipient::Organization { scope: scope.clone() },
            kind: TemplateKind::ShiftCancelled,
            payload: json!({
                "worker_id": worker_id,
                "worker_name": cancelled.aggregate.profile().name,
                "slot": slot,
                "affected_job_count": report.affected_job_count,
            }),
        });

        info!(
            scope = %scope,
            %worker_id,
            %slot,
            affected_jobs = report.affected_job_count,
            "shift cancelled"
        );
        Ok(report)
    }

    /// Delete a worker and release them from every job that references them.
    pub fn delete_worker(
        &self,
        actor: &ActorScope,
        worker_id: WorkerId,
    ) -> Result<CascadeReport, MatchError> {
        let scope = actor.scope()?;
        let worker = self.load_worker(scope, worker_id)?;

        let command = WorkerCommand::RemoveWorker(RemoveWorker {
            scope: scope.clone(),
            worker_id,
            released_jobs: self.jobs_touching(scope, &worker, None),
            occurred_at: Utc::now(),
        });
        let removed = self.dispatch_worker(scope, worker_id, &command)?;
        let affected = self.release_all(
            scope,
            worker_id,
            &released_jobs(&removed.committed),
            ReleaseReason::WorkerRemoved,
        )?;

        let report = CascadeReport::new(affected);
        self.activity.record(ActivityEntry::new(
            scope.clone(),
            ActivityKind::WorkerDeleted { worker_id },
            report.affected_jobs.clone(),
        ));
        self.notify(Notification {
            recipient: Recipient::Organization { scope: scope.clone() },
            kind: TemplateKind::WorkerRemoved,
            payload: json!({
                "worker_id": worker_id,
                "worker_name": worker.profile().name,
                "affected_job_count": report.affected_job_count,
            }),
        });

        info!(
            scope = %scope,
            %worker_id,
            affected_jobs = report.affected_job_count,
            "worker deleted"
        );
        Ok(report)
    }

    pub fn activity(&self, actor: &ActorScope) -> Result<Vec<ActivityEntry>, MatchError> {
        Ok(self.activity.list(actor.scope()?))
    }

    /// Rebuild both read models of the caller's scope from the event store.
    pub fn rebuild_read_models(&self, actor: &ActorScope) -> Result<(), MatchError> {
        let scope = actor.scope()?;
        let envelopes: Vec<_> = self
            .store()
            .load_scope(scope)
            .map_err(|e| MatchError::Internal(e.to_string()))?
            .iter()
            .map(|stored| stored.to_envelope())
            .collect();

        self.workers
            .rebuild_from_scratch(scope, envelopes.clone())
            .and_then(|_| self.jobs.rebuild_from_scratch(scope, envelopes))
            .map_err(|e| MatchError::Internal(e.to_string()))?;

        info!(scope = %scope, "read models rebuilt");
        Ok(())
    }

    // -------------------------
    // Internals
    // -------------------------

    /// Accept in three steps: reserve a placement on the worker, record the
    /// acceptance on the job, then confirm the placement is still held.
    ///
    /// A cascade that commits on the worker before the reservation makes it
    /// fail. One that commits after it lists this job among its releases, or
    /// has dropped the placement by the time it is confirmed, in which case
    /// the acceptance is withdrawn here.
    fn accept(
        &self,
        scope: &OrganizationScope,
        job_id: JobId,
        worker_id: WorkerId,
    ) -> Result<Dispatched<Job>, MatchError> {
        let job = self.load_job(scope, job_id)?;
        let slot = job.slot().ok_or(MatchError::JobNotFound)?;
        if job.workers().contains(&worker_id) {
            return Err(Rejection::AlreadyAccepted.into());
        }
        if job.is_filled() {
            return Err(Rejection::JobAlreadyFilled.into());
        }

        let reserve = WorkerCommand::ReservePlacement(ReservePlacement {
            scope: scope.clone(),
            worker_id,
            job_id,
            slot,
            occurred_at: Utc::now(),
        });
        let reserved = self.dispatch_worker(scope, worker_id, &reserve)?;
        let newly_reserved = !reserved.committed.is_empty();

        let command = JobCommand::AcceptInvitation(AcceptInvitation {
            scope: scope.clone(),
            job_id,
            worker_id,
            worker_availability: reserved.aggregate.availability().to_vec(),
            occurred_at: Utc::now(),
        });
        let accepted = match self.dispatch_job(scope, job_id, &command) {
            Ok(accepted) => accepted,
            Err(err) => {
                if newly_reserved {
                    self.forget_placement(scope, worker_id, job_id);
                }
                return Err(err);
            }
        };

        let lost = match self.load_worker(scope, worker_id) {
            Ok(worker) if worker.is_placed_on(job_id) => return Ok(accepted),
            Ok(_) => MatchError::Rejected(Rejection::NotAvailable),
            Err(err) => err,
        };

        warn!(
            scope = %scope,
            %job_id,
            %worker_id,
            code = lost.code(),
            "worker changed while accepting, withdrawing acceptance"
        );
        let reason = match lost {
            MatchError::WorkerNotFound => ReleaseReason::WorkerRemoved,
            _ => ReleaseReason::ShiftCancelled,
        };
        if let Err(err) = self.release(scope, job_id, worker_id, reason) {
            error!(
                scope = %scope,
                %job_id,
                %worker_id,
                error = %err,
                "failed to withdraw acceptance"
            );
        }
        Err(lost)
    }

    fn decline(
        &self,
        scope: &OrganizationScope,
        job_id: JobId,
        worker_id: WorkerId,
    ) -> Result<Dispatched<Job>, MatchError> {
        self.load_job(scope, job_id)?;
        let worker = self.load_worker(scope, worker_id)?;

        let command = JobCommand::DeclineInvitation(DeclineInvitation {
            scope: scope.clone(),
            job_id,
            worker_id,
            listed_on_worker: worker.is_invited_to(job_id),
            occurred_at: Utc::now(),
        });
        self.dispatch_job(scope, job_id, &command)
    }

    /// Jobs on `slot` (any slot when `None`) that the job board or the worker's
    /// invitation list ties to the worker. The worker adds its own placements
    /// when it decides the cascade.
    fn jobs_touching(
        &self,
        scope: &OrganizationScope,
        worker: &Worker,
        slot: Option<ShiftSlot>,
    ) -> Vec<JobId> {
        let on_slot = |view: &JobView| slot.is_none_or(|s| view.slot == s);

        let mut job_ids: Vec<JobId> = self
            .jobs
            .referencing(scope, worker.id_typed())
            .iter()
            .filter(|view| on_slot(*view))
            .map(|view| view.job_id)
            .collect();

        for job_id in worker.invited_jobs() {
            if job_ids.contains(job_id) {
                continue;
            }
            let include = match slot {
                None => true,
                Some(_) => self.jobs.get(scope, job_id).is_some_and(|view| on_slot(&view)),
            };
            if include {
                job_ids.push(*job_id);
            }
        }

        job_ids
    }

    /// Release the worker from each job; returns the jobs that changed.
    fn release_all(
        &self,
        scope: &OrganizationScope,
        worker_id: WorkerId,
        job_ids: &[JobId],
        reason: ReleaseReason,
    ) -> Result<Vec<JobId>, MatchError> {
        let mut affected = Vec::new();
        for &job_id in job_ids {
            match self.release(scope, job_id, worker_id, reason) {
                Ok(released) if !released.committed.is_empty() => {
                    debug!(
                        scope = %scope,
                        %job_id,
                        %worker_id,
                        filled = released.aggregate.is_filled(),
                        "worker released"
                    );
                    affected.push(job_id);
                }
                Ok(_) | Err(MatchError::JobNotFound) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(affected)
    }

    fn release(
        &self,
        scope: &OrganizationScope,
        job_id: JobId,
        worker_id: WorkerId,
        reason: ReleaseReason,
    ) -> Result<Dispatched<Job>, MatchError> {
        let command = JobCommand::ReleaseWorker(ReleaseWorker {
            scope: scope.clone(),
            job_id,
            worker_id,
            reason,
            occurred_at: Utc::now(),
        });
        self.dispatch_job(scope, job_id, &command)
    }

    /// Record the job on each invitee and owe them an `Invited` notification.
    ///
    /// An invitee that can no longer be updated is released from the job again.
    fn deliver_invitations(&self, scope: &OrganizationScope, job: &Job, invitees: &[WorkerId]) {
        let job_id = job.id_typed();

        for &worker_id in invitees {
            let command = WorkerCommand::RecordInvitation(RecordInvitation {
                scope: scope.clone(),
                worker_id,
                job_id,
                occurred_at: Utc::now(),
            });

            match self.dispatch_worker(scope, worker_id, &command) {
                Ok(recorded) if recorded.committed.is_empty() => {}
                Ok(recorded) => self.notify(Notification {
                    recipient: worker_recipient(&recorded.aggregate),
                    kind: TemplateKind::Invited,
                    payload: json!({
                        "job_id": job_id,
                        "title": job.details().title,
                        "location": job.details().location,
                        "slot": job.slot(),
                    }),
                }),
                Err(err) => {
                    warn!(
                        scope = %scope,
                        %job_id,
                        %worker_id,
                        error = %err,
                        "invitee unavailable, releasing"
                    );
                    let released =
                        self.release(scope, job_id, worker_id, ReleaseReason::WorkerRemoved);
                    if let Err(err) = released {
                        error!(
                            scope = %scope,
                            %job_id,
                            %worker_id,
                            error = %err,
                            "failed to release invitee"
                        );
                    }
                }
            }
        }
    }

    /// Drop the job from the worker's invitation list. A deleted worker has none.
    fn forget_invitation(&self, scope: &OrganizationScope, worker_id: WorkerId, job_id: JobId) {
        let command = WorkerCommand::ClearInvitation(ClearInvitation {
            scope: scope.clone(),
            worker_id,
            job_id,
            occurred_at: Utc::now(),
        });
        self.update_worker_quietly(scope, worker_id, job_id, &command);
    }

    fn forget_placement(&self, scope: &OrganizationScope, worker_id: WorkerId, job_id: JobId) {
        let command = WorkerCommand::ReleasePlacement(ReleasePlacement {
            scope: scope.clone(),
            worker_id,
            job_id,
            occurred_at: Utc::now(),
        });
        self.update_worker_quietly(scope, worker_id, job_id, &command);
    }

    /// Worker-side bookkeeping after a committed job change. Failures are
    /// logged; the job change stands.
    fn update_worker_quietly(
        &self,
        scope: &OrganizationScope,
        worker_id: WorkerId,
        job_id: JobId,
        command: &WorkerCommand,
    ) {
        match self.dispatch_worker(scope, worker_id, command) {
            Ok(_) | Err(MatchError::WorkerNotFound) => {}
            Err(err) => warn!(
                scope = %scope,
                %job_id,
                %worker_id,
                error = %err,
                "worker record left stale after job update"
            ),
        }
    }

    /// `Conflict` when another worker of the scope already uses `email`.
    fn ensure_email_free(
        &self,
        scope: &OrganizationScope,
        email: &str,
        owner: Option<WorkerId>,
    ) -> Result<(), MatchError> {
        match self.workers.find_by_email(scope, email) {
            Some(existing) if Some(existing.worker_id) != owner => Err(MatchError::Conflict(
                format!("a worker with e-mail '{}' already exists", email.trim()),
            )),
            _ => Ok(()),
        }
    }

    fn dispatch_worker(
        &self,
        scope: &OrganizationScope,
        worker_id: WorkerId,
        command: &WorkerCommand,
    ) -> Result<Dispatched<Worker>, MatchError> {
        let dispatched = self
            .dispatcher
            .dispatch_with_retry(
                &self.config.retry,
                scope,
                worker_id.aggregate_id(),
                WORKER_AGGREGATE_TYPE,
                command,
                |id| Worker::empty(WorkerId::from(id)),
            )
            .map_err(|e| dispatch_failed(e, MatchError::WorkerNotFound))?;

        if !dispatched.committed.is_empty() {
            self.project(scope, worker_id.aggregate_id())?;
        }
        Ok(dispatched)
    }

    fn dispatch_job(
        &self,
        scope: &OrganizationScope,
        job_id: JobId,
        command: &JobCommand,
    ) -> Result<Dispatched<Job>, MatchError> {
        let dispatched = self
            .dispatcher
            .dispatch_with_retry(
                &self.config.retry,
                scope,
                job_id.aggregate_id(),
                JOB_AGGREGATE_TYPE,
                command,
                |id| Job::empty(JobId::from(id)),
            )
            .map_err(|e| dispatch_failed(e, MatchError::JobNotFound))?;

        if !dispatched.committed.is_empty() {
            self.project(scope, job_id.aggregate_id())?;
        }
        Ok(dispatched)
    }

    fn load_worker(
        &self,
        scope: &OrganizationScope,
        worker_id: WorkerId,
    ) -> Result<Worker, MatchError> {
        let worker = self
            .dispatcher
            .load(scope, worker_id.aggregate_id(), |id| Worker::empty(WorkerId::from(id)))
            .map_err(|e| dispatch_failed(e, MatchError::WorkerNotFound))?;
        if !worker.is_active() {
            return Err(MatchError::WorkerNotFound);
        }
        Ok(worker)
    }

    fn load_job(&self, scope: &OrganizationScope, job_id: JobId) -> Result<Job, MatchError> {
        let job = self
            .dispatcher
            .load(scope, job_id.aggregate_id(), |id| Job::empty(JobId::from(id)))
            .map_err(|e| dispatch_failed(e, MatchError::JobNotFound))?;
        if !job.is_active() {
            return Err(MatchError::JobNotFound);
        }
        Ok(job)
    }

    /// Feed the aggregate's full stream to both projections.
    ///
    /// Each call replays a complete prefix of the stream, so concurrent callers
    /// never leave a gap; already-applied envelopes are skipped by the cursors.
    fn project(
        &self,
        scope: &OrganizationScope,
        aggregate_id: AggregateId,
    ) -> Result<(), MatchError> {
        let stream = self
            .store()
            .load_stream(scope, aggregate_id)
            .map_err(|e| MatchError::Internal(e.to_string()))?;

        for stored in &stream {
            let envelope = stored.to_envelope();
            self.workers
                .apply_envelope(&envelope)
                .and_then(|_| self.jobs.apply_envelope(&envelope))
                .map_err(|e| {
                    error!(
                        scope = %scope,
                        %aggregate_id,
                        sequence = stored.sequence_number,
                        error = %e,
                        "projection failed"
                    );
                    MatchError::Internal(e.to_string())
                })?;
        }
        Ok(())
    }

    /// `Unauthorized` when another scope owns the aggregate, `missing` when nobody does.
    fn ensure_owned(
        &self,
        scope: &OrganizationScope,
        aggregate_id: AggregateId,
        missing: MatchError,
    ) -> Result<(), MatchError> {
        match self.store().owner_of(aggregate_id) {
            Ok(Some(owner)) if owner == *scope => Ok(()),
            Ok(Some(_)) => Err(MatchError::Unauthorized),
            Ok(None) => Err(missing),
            Err(e) => Err(MatchError::Internal(e.to_string())),
        }
    }

    fn worker_view(
        &self,
        scope: &OrganizationScope,
        worker_id: WorkerId,
    ) -> Result<WorkerView, MatchError> {
        self.workers.get(scope, &worker_id).ok_or(MatchError::WorkerNotFound)
    }

    fn job_view(&self, scope: &OrganizationScope, job_id: JobId) -> Result<JobView, MatchError> {
        self.jobs.get(scope, &job_id).ok_or(MatchError::JobNotFound)
    }

    fn notify(&self, notification: Notification) {
        if let Err(err) = self.notifier.dispatch(&notification) {
            warn!(kind = notification.kind.as_str(), error = %err, "notification not delivered");
        }
    }
}

fn worker_recipient(worker: &Worker) -> Recipient {
    Recipient::Worker {
        worker_id: worker.id_typed(),
        email: worker.profile().email.clone(),
        push_token: worker.push_token().map(str::to_string),
    }
}

fn decoded<E: DeserializeOwned>(committed: &[StoredEvent]) -> impl Iterator<Item = E> + '_ {
    committed
        .iter()
        .filter_map(|stored| serde_json::from_value::<E>(stored.payload.clone()).ok())
}

/// Jobs a committed cascade event tells the engine to release.
fn released_jobs(committed: &[StoredEvent]) -> Vec<JobId> {
    decoded::<WorkerEvent>(committed)
        .flat_map(|event| match event {
            WorkerEvent::AvailabilityCancelled(e) => e.released_jobs,
            WorkerEvent::WorkerRemoved(e) => e.released_jobs,
            _ => Vec::new(),
        })
        .collect()
}

fn dispatch_failed(err: DispatchError, missing: MatchError) -> MatchError {
    if let DispatchError::RetriesExhausted { attempts, last } = &err {
        error!(attempts, last = %last, "update abandoned after repeated version conflicts");
    }
    MatchError::from_dispatch(err, missing)
}
