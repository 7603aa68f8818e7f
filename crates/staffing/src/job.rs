use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shiftmatch_core::{
    Aggregate, AggregateRoot, DomainError, JobId, OrganizationScope, Rejection, ShiftSlot, WorkerId,
};
use shiftmatch_events::Event;

use crate::matching::InvitationPolicy;

/// Descriptive fields of a job. Not used by matching.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobDetails {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// Why a worker was taken off a job without responding to it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    /// The worker cancelled the availability slot this job runs in.
    ShiftCancelled,
    /// The worker was deleted by the organization.
    WorkerRemoved,
    /// The organization removed the worker from this job.
    RemovedByOrganization,
}

/// Aggregate root: Job.
///
/// `filled` is derived state: it is recomputed from `workers` after every
/// applied event and never carried on an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    id: JobId,
    scope: Option<OrganizationScope>,
    details: JobDetails,
    slot: Option<ShiftSlot>,
    workers_required: u32,
    policy: Option<InvitationPolicy>,
    invited_workers: Vec<WorkerId>,
    workers: Vec<WorkerId>,
    filled: bool,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Job {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: JobId) -> Self {
        Self {
            id,
            scope: None,
            details: JobDetails::default(),
            slot: None,
            workers_required: 0,
            policy: None,
            invited_workers: Vec::new(),
            workers: Vec::new(),
            filled: false,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> JobId {
        self.id
    }

    pub fn scope(&self) -> Option<&OrganizationScope> {
        self.scope.as_ref()
    }

    pub fn details(&self) -> &JobDetails {
        &self.details
    }

    pub fn slot(&self) -> Option<ShiftSlot> {
        self.slot
    }

    pub fn workers_required(&self) -> u32 {
        self.workers_required
    }

    pub fn policy(&self) -> Option<InvitationPolicy> {
        self.policy
    }

    pub fn invited_workers(&self) -> &[WorkerId] {
        &self.invited_workers
    }

    pub fn workers(&self) -> &[WorkerId] {
        &self.workers
    }

    /// `jobStatus`: true once enough workers have accepted.
    pub fn is_filled(&self) -> bool {
        self.filled
    }

    pub fn is_active(&self) -> bool {
        self.created && !self.deleted
    }

    /// Invited or accepted.
    pub fn references(&self, worker_id: WorkerId) -> bool {
        self.invited_workers.contains(&worker_id) || self.workers.contains(&worker_id)
    }

    fn recompute_filled(&mut self) {
        self.filled = self.workers.len() as u64 >= u64::from(self.workers_required);
    }
}

impl AggregateRoot for Job {
    type Id = JobId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateJob.
///
/// `invitees` come from candidate selection; the aggregate only dedups them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJob {
    pub scope: OrganizationScope,
    pub job_id: JobId,
    pub details: JobDetails,
    pub slot: ShiftSlot,
    pub workers_required: u32,
    pub invitees: Vec<WorkerId>,
    pub policy: InvitationPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: InviteWorkers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteWorkers {
    pub scope: OrganizationScope,
    pub job_id: JobId,
    pub worker_ids: Vec<WorkerId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AcceptInvitation.
///
/// `worker_availability` is the worker's slot list as loaded by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptInvitation {
    pub scope: OrganizationScope,
    pub job_id: JobId,
    pub worker_id: WorkerId,
    pub worker_availability: Vec<ShiftSlot>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeclineInvitation.
///
/// `listed_on_worker` is true when the worker still lists this job among its
/// invited jobs, which counts as an open invitation on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclineInvitation {
    pub scope: OrganizationScope,
    pub job_id: JobId,
    pub worker_id: WorkerId,
    pub listed_on_worker: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseWorker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseWorker {
    pub scope: OrganizationScope,
    pub job_id: JobId,
    pub worker_id: WorkerId,
    pub reason: ReleaseReason,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteJob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteJob {
    pub scope: OrganizationScope,
    pub job_id: JobId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobCommand {
    CreateJob(CreateJob),
    InviteWorkers(InviteWorkers),
    AcceptInvitation(AcceptInvitation),
    DeclineInvitation(DeclineInvitation),
    ReleaseWorker(ReleaseWorker),
    DeleteJob(DeleteJob),
}

/// Event: JobCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCreated {
    pub scope: OrganizationScope,
    pub job_id: JobId,
    pub details: JobDetails,
    pub slot: ShiftSlot,
    pub workers_required: u32,
    pub invitees: Vec<WorkerId>,
    pub policy: InvitationPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WorkersInvited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkersInvited {
    pub scope: OrganizationScope,
    pub job_id: JobId,
    pub worker_ids: Vec<WorkerId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvitationAccepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationAccepted {
    pub scope: OrganizationScope,
    pub job_id: JobId,
    pub worker_id: WorkerId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvitationDeclined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationDeclined {
    pub scope: OrganizationScope,
    pub job_id: JobId,
    pub worker_id: WorkerId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WorkerReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReleased {
    pub scope: OrganizationScope,
    pub job_id: JobId,
    pub worker_id: WorkerId,
    pub reason: ReleaseReason,
    pub occurred_at: DateTime<Utc>,
}

/// Event: JobDeleted.
///
/// `invitees` and `workers` are the open invitations and accepted workers at
/// deletion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDeleted {
    pub scope: OrganizationScope,
    pub job_id: JobId,
    pub invitees: Vec<WorkerId>,
    #[serde(default)]
    pub workers: Vec<WorkerId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEvent {
    JobCreated(JobCreated),
    WorkersInvited(WorkersInvited),
    InvitationAccepted(InvitationAccepted),
    InvitationDeclined(InvitationDeclined),
    WorkerReleased(WorkerReleased),
    JobDeleted(JobDeleted),
}

impl JobEvent {
    pub fn scope(&self) -> &OrganizationScope {
        match self {
            JobEvent::JobCreated(e) => &e.scope,
            JobEvent::WorkersInvited(e) => &e.scope,
            JobEvent::InvitationAccepted(e) => &e.scope,
            JobEvent::InvitationDeclined(e) => &e.scope,
            JobEvent::WorkerReleased(e) => &e.scope,
            JobEvent::JobDeleted(e) => &e.scope,
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::JobCreated(e) => e.job_id,
            JobEvent::WorkersInvited(e) => e.job_id,
            JobEvent::InvitationAccepted(e) => e.job_id,
            JobEvent::InvitationDeclined(e) => e.job_id,
            JobEvent::WorkerReleased(e) => e.job_id,
            JobEvent::JobDeleted(e) => e.job_id,
        }
    }
}

impl Event for JobEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JobEvent::JobCreated(_) => "staffing.job.created",
            JobEvent::WorkersInvited(_) => "staffing.job.workers_invited",
            JobEvent::InvitationAccepted(_) => "staffing.job.invitation_accepted",
            JobEvent::InvitationDeclined(_) => "staffing.job.invitation_declined",
            JobEvent::WorkerReleased(_) => "staffing.job.worker_released",
            JobEvent::JobDeleted(_) => "staffing.job.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobCreated(e) => e.occurred_at,
            JobEvent::WorkersInvited(e) => e.occurred_at,
            JobEvent::InvitationAccepted(e) => e.occurred_at,
            JobEvent::InvitationDeclined(e) => e.occurred_at,
            JobEvent::WorkerReleased(e) => e.occurred_at,
            JobEvent::JobDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Job {
    type Command = JobCommand;
    type Event = JobEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JobEvent::JobCreated(e) => {
                self.id = e.job_id;
                self.scope = Some(e.scope.clone());
                self.details = e.details.clone();
                self.slot = Some(e.slot);
                self.workers_required = e.workers_required;
                self.policy = Some(e.policy);
                self.invited_workers = e.invitees.clone();
                self.workers.clear();
                self.created = true;
            }
            JobEvent::WorkersInvited(e) => {
                for id in &e.worker_ids {
                    if !self.references(*id) {
                        self.invited_workers.push(*id);
                    }
                }
            }
            JobEvent::InvitationAccepted(e) => {
                self.invited_workers.retain(|w| *w != e.worker_id);
                if !self.workers.contains(&e.worker_id) {
                    self.workers.push(e.worker_id);
                }
            }
            JobEvent::InvitationDeclined(e) => {
                self.invited_workers.retain(|w| *w != e.worker_id);
                self.workers.retain(|w| *w != e.worker_id);
            }
            JobEvent::WorkerReleased(e) => {
                self.invited_workers.retain(|w| *w != e.worker_id);
                self.workers.retain(|w| *w != e.worker_id);
            }
            JobEvent::JobDeleted(_) => {
                self.deleted = true;
            }
        }

        self.recompute_filled();
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JobCommand::CreateJob(cmd) => self.handle_create(cmd),
            JobCommand::InviteWorkers(cmd) => self.handle_invite(cmd),
            JobCommand::AcceptInvitation(cmd) => self.handle_accept(cmd),
            JobCommand::DeclineInvitation(cmd) => self.handle_decline(cmd),
            JobCommand::ReleaseWorker(cmd) => self.handle_release(cmd),
            JobCommand::DeleteJob(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Job {
    fn ensure_active(&self, scope: &OrganizationScope, job_id: JobId) -> Result<(), DomainError> {
        if !self.is_active() {
            return Err(DomainError::not_found());
        }
        if self.scope.as_ref() != Some(scope) {
            return Err(DomainError::Unauthorized);
        }
        if self.id != job_id {
            return Err(DomainError::invariant("job_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateJob) -> Result<Vec<JobEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("job already exists"));
        }
        if cmd.workers_required == 0 {
            return Err(DomainError::validation("workers_required must be positive"));
        }
        if cmd.details.title.trim().is_empty() {
            return Err(DomainError::validation("title cannot be empty"));
        }

        let mut invitees = Vec::with_capacity(cmd.invitees.len());
        for id in &cmd.invitees {
            if !invitees.contains(id) {
                invitees.push(*id);
            }
        }

        let mut details = cmd.details.clone();
        details.title = details.title.trim().to_string();

        Ok(vec![JobEvent::JobCreated(JobCreated {
            scope: cmd.scope.clone(),
            job_id: cmd.job_id,
            details,
            slot: cmd.slot,
            workers_required: cmd.workers_required,
            invitees,
            policy: cmd.policy,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_invite(&self, cmd: &InviteWorkers) -> Result<Vec<JobEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.job_id)?;

        // Accepted workers are never re-invited; known invitees are skipped.
        let mut fresh: Vec<WorkerId> = Vec::new();
        for id in &cmd.worker_ids {
            if !self.references(*id) && !fresh.contains(id) {
                fresh.push(*id);
            }
        }
        if fresh.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![JobEvent::WorkersInvited(WorkersInvited {
            scope: cmd.scope.clone(),
            job_id: cmd.job_id,
            worker_ids: fresh,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_accept(&self, cmd: &AcceptInvitation) -> Result<Vec<JobEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.job_id)?;

        if self.workers.contains(&cmd.worker_id) {
            return Err(Rejection::AlreadyAccepted.into());
        }
        if self.filled {
            return Err(Rejection::JobAlreadyFilled.into());
        }
        let available = self
            .slot
            .is_some_and(|slot| cmd.worker_availability.contains(&slot));
        if !available {
            return Err(Rejection::NotAvailable.into());
        }

        Ok(vec![JobEvent::InvitationAccepted(InvitationAccepted {
            scope: cmd.scope.clone(),
            job_id: cmd.job_id,
            worker_id: cmd.worker_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_decline(&self, cmd: &DeclineInvitation) -> Result<Vec<JobEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.job_id)?;

        // A stale worker-side listing never removes an accepted worker.
        if self.workers.contains(&cmd.worker_id) {
            return Err(Rejection::NotInvited.into());
        }
        if !self.invited_workers.contains(&cmd.worker_id) && !cmd.listed_on_worker {
            return Err(Rejection::NotInvited.into());
        }

        Ok(vec![JobEvent::InvitationDeclined(InvitationDeclined {
            scope: cmd.scope.clone(),
            job_id: cmd.job_id,
            worker_id: cmd.worker_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseWorker) -> Result<Vec<JobEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.job_id)?;

        if !self.references(cmd.worker_id) {
            return Ok(vec![]);
        }

        Ok(vec![JobEvent::WorkerReleased(WorkerReleased {
            scope: cmd.scope.clone(),
            job_id: cmd.job_id,
            worker_id: cmd.worker_id,
            reason: cmd.reason,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteJob) -> Result<Vec<JobEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.job_id)?;

        Ok(vec![JobEvent::JobDeleted(JobDeleted {
            scope: cmd.scope.clone(),
            job_id: cmd.job_id,
            invitees: self.invited_workers.clone(),
            workers: self.workers.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
