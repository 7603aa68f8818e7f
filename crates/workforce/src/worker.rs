use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shiftmatch_core::{
    Aggregate, AggregateRoot, DomainError, JobId, OrganizationScope, Rejection, ShiftSlot, WorkerId,
};
use shiftmatch_events::Event;

/// Contact and HR details of a worker. Not used by matching.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
}

/// Partial profile edit; `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A job the worker holds a confirmed place on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub job_id: JobId,
    pub slot: ShiftSlot,
}

/// Aggregate root: Worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    id: WorkerId,
    scope: Option<OrganizationScope>,
    profile: WorkerProfile,
    approved: bool,
    /// Insertion-ordered; never holds the same slot twice.
    availability: Vec<ShiftSlot>,
    /// Jobs with an open invitation; never holds the same job twice.
    invited_jobs: Vec<JobId>,
    /// Accepted jobs, recorded before the job side commits the acceptance.
    placements: Vec<Placement>,
    push_token: Option<String>,
    version: u64,
    created: bool,
    removed: bool,
}

impl Worker {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: WorkerId) -> Self {
        Self {
            id,
            scope: None,
            profile: WorkerProfile::default(),
            approved: false,
            availability: Vec::new(),
            invited_jobs: Vec::new(),
            placements: Vec::new(),
            push_token: None,
            version: 0,
            created: false,
            removed: false,
        }
    }

    pub fn id_typed(&self) -> WorkerId {
        self.id
    }

    pub fn scope(&self) -> Option<&OrganizationScope> {
        self.scope.as_ref()
    }

    pub fn profile(&self) -> &WorkerProfile {
        &self.profile
    }

    pub fn is_approved(&self) -> bool {
        self.approved
    }

    pub fn availability(&self) -> &[ShiftSlot] {
        &self.availability
    }

    pub fn invited_jobs(&self) -> &[JobId] {
        &self.invited_jobs
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn push_token(&self) -> Option<&str> {
        self.push_token.as_deref()
    }

    /// Registered and not deleted.
    pub fn is_active(&self) -> bool {
        self.created && !self.removed
    }

    pub fn is_available_for(&self, slot: &ShiftSlot) -> bool {
        self.availability.contains(slot)
    }

    pub fn is_invited_to(&self, job_id: JobId) -> bool {
        self.invited_jobs.contains(&job_id)
    }

    pub fn is_placed_on(&self, job_id: JobId) -> bool {
        self.placements.iter().any(|p| p.job_id == job_id)
    }
}

impl AggregateRoot for Worker {
    type Id = WorkerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterWorker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWorker {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub profile: WorkerProfile,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveWorker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveWorker {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub changes: ProfileChanges,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddAvailability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAvailability {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub slot: ShiftSlot,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelAvailability.
///
/// `released_jobs` are the jobs the caller knows to reference the worker on
/// this slot. The emitted event adds every placement held on the slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAvailability {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub slot: ShiftSlot,
    pub released_jobs: Vec<JobId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordInvitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInvitation {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub job_id: JobId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ClearInvitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearInvitation {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub job_id: JobId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReservePlacement.
///
/// Taken before the job records the acceptance, so a concurrent cascade on
/// this worker either sees the placement or makes the reservation fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservePlacement {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub job_id: JobId,
    pub slot: ShiftSlot,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleasePlacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePlacement {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub job_id: JobId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetPushToken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPushToken {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub token: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveWorker.
///
/// The emitted event lists `released_jobs` plus every invitation and
/// placement the worker still holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveWorker {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub released_jobs: Vec<JobId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerCommand {
    RegisterWorker(RegisterWorker),
    ApproveWorker(ApproveWorker),
    UpdateProfile(UpdateProfile),
    AddAvailability(AddAvailability),
    CancelAvailability(CancelAvailability),
    RecordInvitation(RecordInvitation),
    ClearInvitation(ClearInvitation),
    ReservePlacement(ReservePlacement),
    ReleasePlacement(ReleasePlacement),
    SetPushToken(SetPushToken),
    RemoveWorker(RemoveWorker),
}

/// Event: WorkerRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRegistered {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub profile: WorkerProfile,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WorkerApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerApproved {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProfileUpdated. Carries the full profile after the edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdated {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub profile: WorkerProfile,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AvailabilityAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityAdded {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub slot: ShiftSlot,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AvailabilityCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityCancelled {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub slot: ShiftSlot,
    pub released_jobs: Vec<JobId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvitationRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationRecorded {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub job_id: JobId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvitationCleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationCleared {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub job_id: JobId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PlacementReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementReserved {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub placement: Placement,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PlacementReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementReleased {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub job_id: JobId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PushTokenSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTokenSet {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub token: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WorkerRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRemoved {
    pub scope: OrganizationScope,
    pub worker_id: WorkerId,
    pub released_jobs: Vec<JobId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerEvent {
    WorkerRegistered(WorkerRegistered),
    WorkerApproved(WorkerApproved),
    ProfileUpdated(ProfileUpdated),
    AvailabilityAdded(AvailabilityAdded),
    AvailabilityCancelled(AvailabilityCancelled),
    InvitationRecorded(InvitationRecorded),
    InvitationCleared(InvitationCleared),
    PlacementReserved(PlacementReserved),
    PlacementReleased(PlacementReleased),
    PushTokenSet(PushTokenSet),
    WorkerRemoved(WorkerRemoved),
}

impl WorkerEvent {
    pub fn scope(&self) -> &OrganizationScope {
        match self {
            WorkerEvent::WorkerRegistered(e) => &e.scope,
            WorkerEvent::WorkerApproved(e) => &e.scope,
            WorkerEvent::ProfileUpdated(e) => &e.scope,
            WorkerEvent::AvailabilityAdded(e) => &e.scope,
            WorkerEvent::AvailabilityCancelled(e) => &e.scope,
            WorkerEvent::InvitationRecorded(e) => &e.scope,
            WorkerEvent::InvitationCleared(e) => &e.scope,
            WorkerEvent::PlacementReserved(e) => &e.scope,
            WorkerEvent::PlacementReleased(e) => &e.scope,
            WorkerEvent::PushTokenSet(e) => &e.scope,
            WorkerEvent::WorkerRemoved(e) => &e.scope,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        match self {
            WorkerEvent::WorkerRegistered(e) => e.worker_id,
            WorkerEvent::WorkerApproved(e) => e.worker_id,
            WorkerEvent::ProfileUpdated(e) => e.worker_id,
            WorkerEvent::AvailabilityAdded(e) => e.worker_id,
            WorkerEvent::AvailabilityCancelled(e) => e.worker_id,
            WorkerEvent::InvitationRecorded(e) => e.worker_id,
            WorkerEvent::InvitationCleared(e) => e.worker_id,
            WorkerEvent::PlacementReserved(e) => e.worker_id,
            WorkerEvent::PlacementReleased(e) => e.worker_id,
            WorkerEvent::PushTokenSet(e) => e.worker_id,
            WorkerEvent::WorkerRemoved(e) => e.worker_id,
        }
    }
}

impl Event for WorkerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WorkerEvent::WorkerRegistered(_) => "workforce.worker.registered",
            WorkerEvent::WorkerApproved(_) => "workforce.worker.approved",
            WorkerEvent::ProfileUpdated(_) => "workforce.worker.profile_updated",
            WorkerEvent::AvailabilityAdded(_) => "workforce.worker.availability_added",
            WorkerEvent::AvailabilityCancelled(_) => "workforce.worker.availability_cancelled",
            WorkerEvent::InvitationRecorded(_) => "workforce.worker.invitation_recorded",
            WorkerEvent::InvitationCleared(_) => "workforce.worker.invitation_cleared",
            WorkerEvent::PlacementReserved(_) => "workforce.worker.placement_reserved",
            WorkerEvent::PlacementReleased(_) => "workforce.worker.placement_released",
            WorkerEvent::PushTokenSet(_) => "workforce.worker.push_token_set",
            WorkerEvent::WorkerRemoved(_) => "workforce.worker.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WorkerEvent::WorkerRegistered(e) => e.occurred_at,
            WorkerEvent::WorkerApproved(e) => e.occurred_at,
            WorkerEvent::ProfileUpdated(e) => e.occurred_at,
            WorkerEvent::AvailabilityAdded(e) => e.occurred_at,
            WorkerEvent::AvailabilityCancelled(e) => e.occurred_at,
            WorkerEvent::InvitationRecorded(e) => e.occurred_at,
            WorkerEvent::InvitationCleared(e) => e.occurred_at,
            WorkerEvent::PlacementReserved(e) => e.occurred_at,
            WorkerEvent::PlacementReleased(e) => e.occurred_at,
            WorkerEvent::PushTokenSet(e) => e.occurred_at,
            WorkerEvent::WorkerRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Worker {
    type Command = WorkerCommand;
    type Event = WorkerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WorkerEvent::WorkerRegistered(e) => {
                self.id = e.worker_id;
                self.scope = Some(e.scope.clone());
                self.profile = e.profile.clone();
                self.approved = false;
                self.created = true;
            }
            WorkerEvent::WorkerApproved(_) => {
                self.approved = true;
            }
            WorkerEvent::ProfileUpdated(e) => {
                self.profile = e.profile.clone();
            }
            WorkerEvent::AvailabilityAdded(e) => {
                if !self.availability.contains(&e.slot) {
                    self.availability.push(e.slot);
                }
            }
            WorkerEvent::AvailabilityCancelled(e) => {
                self.availability.retain(|s| *s != e.slot);
                self.invited_jobs.retain(|j| !e.released_jobs.contains(j));
                self.placements
                    .retain(|p| p.slot != e.slot && !e.released_jobs.contains(&p.job_id));
            }
            WorkerEvent::InvitationRecorded(e) => {
                if !self.invited_jobs.contains(&e.job_id) {
                    self.invited_jobs.push(e.job_id);
                }
            }
            WorkerEvent::InvitationCleared(e) => {
                self.invited_jobs.retain(|j| *j != e.job_id);
            }
            WorkerEvent::PlacementReserved(e) => {
                if !self.is_placed_on(e.placement.job_id) {
                    self.placements.push(e.placement);
                }
            }
            WorkerEvent::PlacementReleased(e) => {
                self.placements.retain(|p| p.job_id != e.job_id);
            }
            WorkerEvent::PushTokenSet(e) => {
                self.push_token = Some(e.token.clone());
            }
            WorkerEvent::WorkerRemoved(_) => {
                self.invited_jobs.clear();
                self.placements.clear();
                self.availability.clear();
                self.removed = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WorkerCommand::RegisterWorker(cmd) => self.handle_register(cmd),
            WorkerCommand::ApproveWorker(cmd) => self.handle_approve(cmd),
            WorkerCommand::UpdateProfile(cmd) => self.handle_update_profile(cmd),
            WorkerCommand::AddAvailability(cmd) => self.handle_add_availability(cmd),
            WorkerCommand::CancelAvailability(cmd) => self.handle_cancel_availability(cmd),
            WorkerCommand::RecordInvitation(cmd) => self.handle_record_invitation(cmd),
            WorkerCommand::ClearInvitation(cmd) => self.handle_clear_invitation(cmd),
            WorkerCommand::ReservePlacement(cmd) => self.handle_reserve_placement(cmd),
            WorkerCommand::ReleasePlacement(cmd) => self.handle_release_placement(cmd),
            WorkerCommand::SetPushToken(cmd) => self.handle_set_push_token(cmd),
            WorkerCommand::RemoveWorker(cmd) => self.handle_remove(cmd),
        }
    }
}

/// Expo push tokens look like `ExponentPushToken[xxxx]` or `ExpoPushToken[xxxx]`.
pub fn is_valid_push_token(token: &str) -> bool {
    ["ExponentPushToken[", "ExpoPushToken["]
        .iter()
        .filter_map(|prefix| token.strip_prefix(prefix))
        .filter_map(|rest| rest.strip_suffix(']'))
        .any(|inner| !inner.is_empty() && !inner.contains(['[', ']']))
}

impl Worker {
    /// Registered, not removed, same scope, same id.
    fn ensure_active(
        &self,
        scope: &OrganizationScope,
        worker_id: WorkerId,
    ) -> Result<(), DomainError> {
        if !self.is_active() {
            return Err(DomainError::not_found());
        }
        if self.scope.as_ref() != Some(scope) {
            return Err(DomainError::Unauthorized);
        }
        if self.id != worker_id {
            return Err(DomainError::invariant("worker_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterWorker) -> Result<Vec<WorkerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("worker already exists"));
        }

        Ok(vec![WorkerEvent::WorkerRegistered(WorkerRegistered {
            scope: cmd.scope.clone(),
            worker_id: cmd.worker_id,
            profile: normalized_profile(cmd.profile.clone())?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_profile(&self, cmd: &UpdateProfile) -> Result<Vec<WorkerEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.worker_id)?;

        let changes = cmd.changes.clone();
        let mut profile = self.profile.clone();
        if let Some(name) = changes.name {
            profile.name = name.trim().to_string();
        }
        if let Some(email) = changes.email {
            profile.email = email;
        }
        if changes.phone.is_some() {
            profile.phone = changes.phone;
        }
        if changes.role.is_some() {
            profile.role = changes.role;
        }
        if changes.department.is_some() {
            profile.department = changes.department;
        }

        let profile = normalized_profile(profile)?;
        if profile == self.profile {
            return Ok(vec![]);
        }

        Ok(vec![WorkerEvent::ProfileUpdated(ProfileUpdated {
            scope: cmd.scope.clone(),
            worker_id: cmd.worker_id,
            profile,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveWorker) -> Result<Vec<WorkerEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.worker_id)?;

        if self.approved {
            return Err(DomainError::conflict("worker is already approved"));
        }

        Ok(vec![WorkerEvent::WorkerApproved(WorkerApproved {
            scope: cmd.scope.clone(),
            worker_id: cmd.worker_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_availability(
        &self,
        cmd: &AddAvailability,
    ) -> Result<Vec<WorkerEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.worker_id)?;

        // Set semantics: re-adding a known slot is a no-op.
        if self.availability.contains(&cmd.slot) {
            return Ok(vec![]);
        }

        Ok(vec![WorkerEvent::AvailabilityAdded(AvailabilityAdded {
            scope: cmd.scope.clone(),
            worker_id: cmd.worker_id,
            slot: cmd.slot,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel_availability(
        &self,
        cmd: &CancelAvailability,
    ) -> Result<Vec<WorkerEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.worker_id)?;

        if !self.availability.contains(&cmd.slot) {
            return Err(Rejection::SlotNotFound.into());
        }

        let placed = self
            .placements
            .iter()
            .filter(|p| p.slot == cmd.slot)
            .map(|p| p.job_id);

        Ok(vec![WorkerEvent::AvailabilityCancelled(AvailabilityCancelled {
            scope: cmd.scope.clone(),
            worker_id: cmd.worker_id,
            slot: cmd.slot,
            released_jobs: merged_jobs(&cmd.released_jobs, placed),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_invitation(
        &self,
        cmd: &RecordInvitation,
    ) -> Result<Vec<WorkerEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.worker_id)?;

        if !self.approved {
            return Err(Rejection::WorkerNotApproved.into());
        }
        if self.invited_jobs.contains(&cmd.job_id) {
            return Ok(vec![]);
        }

        Ok(vec![WorkerEvent::InvitationRecorded(InvitationRecorded {
            scope: cmd.scope.clone(),
            worker_id: cmd.worker_id,
            job_id: cmd.job_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_clear_invitation(
        &self,
        cmd: &ClearInvitation,
    ) -> Result<Vec<WorkerEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.worker_id)?;

        if !self.invited_jobs.contains(&cmd.job_id) {
            return Ok(vec![]);
        }

        Ok(vec![WorkerEvent::InvitationCleared(InvitationCleared {
            scope: cmd.scope.clone(),
            worker_id: cmd.worker_id,
            job_id: cmd.job_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve_placement(
        &self,
        cmd: &ReservePlacement,
    ) -> Result<Vec<WorkerEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.worker_id)?;

        if !self.approved {
            return Err(Rejection::WorkerNotApproved.into());
        }
        if self.is_placed_on(cmd.job_id) {
            return Ok(vec![]);
        }
        if !self.availability.contains(&cmd.slot) {
            return Err(Rejection::NotAvailable.into());
        }

        Ok(vec![WorkerEvent::PlacementReserved(PlacementReserved {
            scope: cmd.scope.clone(),
            worker_id: cmd.worker_id,
            placement: Placement {
                job_id: cmd.job_id,
                slot: cmd.slot,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release_placement(
        &self,
        cmd: &ReleasePlacement,
    ) -> Result<Vec<WorkerEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.worker_id)?;

        if !self.is_placed_on(cmd.job_id) {
            return Ok(vec![]);
        }

        Ok(vec![WorkerEvent::PlacementReleased(PlacementReleased {
            scope: cmd.scope.clone(),
            worker_id: cmd.worker_id,
            job_id: cmd.job_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_push_token(&self, cmd: &SetPushToken) -> Result<Vec<WorkerEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.worker_id)?;

        let token = cmd.token.trim();
        if !is_valid_push_token(token) {
            return Err(DomainError::validation("invalid push token format"));
        }
        if self.push_token.as_deref() == Some(token) {
            return Ok(vec![]);
        }

        Ok(vec![WorkerEvent::PushTokenSet(PushTokenSet {
            scope: cmd.scope.clone(),
            worker_id: cmd.worker_id,
            token: token.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveWorker) -> Result<Vec<WorkerEvent>, DomainError> {
        self.ensure_active(&cmd.scope, cmd.worker_id)?;

        let held = self
            .invited_jobs
            .iter()
            .copied()
            .chain(self.placements.iter().map(|p| p.job_id));

        Ok(vec![WorkerEvent::WorkerRemoved(WorkerRemoved {
            scope: cmd.scope.clone(),
            worker_id: cmd.worker_id,
            released_jobs: merged_jobs(&cmd.released_jobs, held),
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn normalized_profile(mut profile: WorkerProfile) -> Result<WorkerProfile, DomainError> {
    if profile.name.trim().is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    let email = profile.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(DomainError::validation("email must be a valid address"));
    }
    profile.email = email.to_lowercase();
    Ok(profile)
}

/// `known` followed by the ids of `extra` it does not contain yet.
fn merged_jobs(known: &[JobId], extra: impl IntoIterator<Item = JobId>) -> Vec<JobId> {
    let mut jobs = known.to_vec();
    for job_id in extra {
        if !jobs.contains(&job_id) {
            jobs.push(job_id);
        }
    }
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use shiftmatch_core::Shift;
    use shiftmatch_events::execute;

    fn test_scope() -> OrganizationScope {
        OrganizationScope::new("COMP1001").unwrap()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn slot(day: u32, shift: Shift) -> ShiftSlot {
        ShiftSlot::new(NaiveDate::from_ymd_opt(2024, 6, day).unwrap(), shift)
    }

    fn profile(name: &str) -> WorkerProfile {
        WorkerProfile {
            name: name.to_string(),
            email: format!("{}@Example.com", name),
            ..WorkerProfile::default()
        }
    }

    fn registered(scope: &OrganizationScope) -> Worker {
        let worker_id = WorkerId::new();
        let mut worker = Worker::empty(worker_id);
        let cmd = WorkerCommand::RegisterWorker(RegisterWorker {
            scope: scope.clone(),
            worker_id,
            profile: profile("Ada"),
            occurred_at: test_time(),
        });
        execute(&mut worker, &cmd).unwrap();
        worker
    }

    fn approve_cmd(scope: &OrganizationScope, worker_id: WorkerId) -> WorkerCommand {
        WorkerCommand::ApproveWorker(ApproveWorker {
            scope: scope.clone(),
            worker_id,
            occurred_at: test_time(),
        })
    }

    fn approved(scope: &OrganizationScope) -> Worker {
        let mut worker = registered(scope);
        let cmd = approve_cmd(scope, worker.id_typed());
        execute(&mut worker, &cmd).unwrap();
        worker
    }

    fn add(scope: &OrganizationScope, worker_id: WorkerId, slot: ShiftSlot) -> WorkerCommand {
        WorkerCommand::AddAvailability(AddAvailability {
            scope: scope.clone(),
            worker_id,
            slot,
            occurred_at: test_time(),
        })
    }

    fn cancel(
        scope: &OrganizationScope,
        worker_id: WorkerId,
        slot: ShiftSlot,
        released_jobs: Vec<JobId>,
    ) -> WorkerCommand {
        WorkerCommand::CancelAvailability(CancelAvailability {
            scope: scope.clone(),
            worker_id,
            slot,
            released_jobs,
            occurred_at: test_time(),
        })
    }

    fn invite(scope: &OrganizationScope, worker_id: WorkerId, job_id: JobId) -> WorkerCommand {
        WorkerCommand::RecordInvitation(RecordInvitation {
            scope: scope.clone(),
            worker_id,
            job_id,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn registration_starts_unapproved() {
        let worker = registered(&test_scope());
        assert!(worker.is_active());
        assert!(!worker.is_approved());
        assert_eq!(worker.profile().email, "ada@example.com");
        assert_eq!(worker.version(), 1);
    }

    #[test]
    fn registering_twice_is_a_conflict() {
        let scope = test_scope();
        let worker = registered(&scope);
        let cmd = WorkerCommand::RegisterWorker(RegisterWorker {
            scope,
            worker_id: worker.id_typed(),
            profile: profile("Ada"),
            occurred_at: test_time(),
        });
        match worker.handle(&cmd).unwrap_err() {
            DomainError::Conflict(_) => {}
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn register_rejects_blank_name_and_bad_email() {
        let worker = Worker::empty(WorkerId::new());

        let mut blank_name = profile("Ada");
        blank_name.name = "  ".to_string();
        let mut bad_email = profile("Ada");
        bad_email.email = "no-at-sign".to_string();

        for bad in [blank_name, bad_email] {
            let cmd = WorkerCommand::RegisterWorker(RegisterWorker {
                scope: test_scope(),
                worker_id: worker.id_typed(),
                profile: bad,
                occurred_at: test_time(),
            });
            assert!(matches!(worker.handle(&cmd), Err(DomainError::Validation(_))));
        }
    }

    #[test]
    fn approving_twice_is_a_conflict() {
        let scope = test_scope();
        let worker = approved(&scope);
        let cmd = approve_cmd(&scope, worker.id_typed());
        assert!(matches!(worker.handle(&cmd), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn adding_the_same_slot_twice_is_idempotent() {
        let scope = test_scope();
        let mut worker = approved(&scope);
        let id = worker.id_typed();
        let morning = slot(1, Shift::Morning);

        let first = execute(&mut worker, &add(&scope, id, morning)).unwrap();
        let second = execute(&mut worker, &add(&scope, id, morning)).unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(worker.availability(), &[morning]);
    }

    #[test]
    fn cancelling_an_unknown_slot_is_rejected() {
        let scope = test_scope();
        let worker = approved(&scope);
        let cmd = cancel(&scope, worker.id_typed(), slot(2, Shift::Evening), vec![]);
        assert_eq!(
            worker.handle(&cmd).unwrap_err(),
            DomainError::Rejected(Rejection::SlotNotFound)
        );
    }

    #[test]
    fn cancelling_a_slot_clears_released_invitations_only() {
        let scope = test_scope();
        let mut worker = approved(&scope);
        let id = worker.id_typed();
        let morning = slot(1, Shift::Morning);
        let kept = JobId::new();
        let released = JobId::new();

        execute(&mut worker, &add(&scope, id, morning)).unwrap();
        execute(&mut worker, &invite(&scope, id, kept)).unwrap();
        execute(&mut worker, &invite(&scope, id, released)).unwrap();
        execute(&mut worker, &cancel(&scope, id, morning, vec![released])).unwrap();

        assert!(worker.availability().is_empty());
        assert_eq!(worker.invited_jobs(), &[kept]);
    }

    #[test]
    fn recording_the_same_invitation_twice_is_a_noop() {
        let scope = test_scope();
        let mut worker = approved(&scope);
        let id = worker.id_typed();
        let job_id = JobId::new();

        execute(&mut worker, &invite(&scope, id, job_id)).unwrap();
        let again = execute(&mut worker, &invite(&scope, id, job_id)).unwrap();

        assert!(again.is_empty());
        assert!(worker.is_invited_to(job_id));
        assert_eq!(worker.invited_jobs().len(), 1);
    }

    #[test]
    fn unapproved_workers_cannot_be_invited() {
        let scope = test_scope();
        let worker = registered(&scope);
        let cmd = invite(&scope, worker.id_typed(), JobId::new());
        assert_eq!(
            worker.handle(&cmd).unwrap_err(),
            DomainError::Rejected(Rejection::WorkerNotApproved)
        );
    }

    #[test]
    fn commands_from_another_scope_are_unauthorized() {
        let worker = approved(&test_scope());
        let other = OrganizationScope::new("COMP2002").unwrap();
        let cmd = add(&other, worker.id_typed(), slot(1, Shift::Morning));
        assert_eq!(worker.handle(&cmd).unwrap_err(), DomainError::Unauthorized);
    }

    #[test]
    fn removed_worker_is_not_found() {
        let scope = test_scope();
        let mut worker = approved(&scope);
        let id = worker.id_typed();
        let remove = WorkerCommand::RemoveWorker(RemoveWorker {
            scope: scope.clone(),
            worker_id: id,
            released_jobs: vec![],
            occurred_at: test_time(),
        });
        execute(&mut worker, &remove).unwrap();

        assert!(!worker.is_active());
        let err = worker.handle(&add(&scope, id, slot(1, Shift::Morning))).unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn push_token_format_is_validated() {
        assert!(is_valid_push_token("ExponentPushToken[abc123]"));
        assert!(is_valid_push_token("ExpoPushToken[xyz]"));
        assert!(!is_valid_push_token("ExponentPushToken[]"));
        assert!(!is_valid_push_token("abc123"));

        let scope = test_scope();
        let mut worker = approved(&scope);
        let id = worker.id_typed();
        let set = |token: &str| {
            WorkerCommand::SetPushToken(SetPushToken {
                scope: scope.clone(),
                worker_id: id,
                token: token.to_string(),
                occurred_at: test_time(),
            })
        };

        assert!(matches!(worker.handle(&set("not-a-token")), Err(DomainError::Validation(_))));
        execute(&mut worker, &set("ExpoPushToken[abc]")).unwrap();
        assert_eq!(worker.push_token(), Some("ExpoPushToken[abc]"));
    }

    fn reserve(
        scope: &OrganizationScope,
        worker_id: WorkerId,
        job_id: JobId,
        slot: ShiftSlot,
    ) -> WorkerCommand {
        WorkerCommand::ReservePlacement(ReservePlacement {
            scope: scope.clone(),
            worker_id,
            job_id,
            slot,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn placements_require_approval_and_a_matching_slot() {
        let scope = test_scope();
        let morning = slot(1, Shift::Morning);

        let pending = registered(&scope);
        let unapproved = reserve(&scope, pending.id_typed(), JobId::new(), morning);
        assert_eq!(
            pending.handle(&unapproved).unwrap_err(),
            DomainError::Rejected(Rejection::WorkerNotApproved)
        );

        let mut worker = approved(&scope);
        let id = worker.id_typed();
        let job_id = JobId::new();
        assert_eq!(
            worker.handle(&reserve(&scope, id, job_id, morning)).unwrap_err(),
            DomainError::Rejected(Rejection::NotAvailable)
        );

        execute(&mut worker, &add(&scope, id, morning)).unwrap();
        execute(&mut worker, &reserve(&scope, id, job_id, morning)).unwrap();
        let again = execute(&mut worker, &reserve(&scope, id, job_id, morning)).unwrap();

        assert!(again.is_empty());
        assert!(worker.is_placed_on(job_id));
        assert_eq!(worker.placements().len(), 1);
    }

    #[test]
    fn cancelling_a_slot_releases_its_placements() {
        let scope = test_scope();
        let mut worker = approved(&scope);
        let id = worker.id_typed();
        let (morning, evening) = (slot(1, Shift::Morning), slot(1, Shift::Evening));
        let (on_morning, on_evening) = (JobId::new(), JobId::new());

        execute(&mut worker, &add(&scope, id, morning)).unwrap();
        execute(&mut worker, &add(&scope, id, evening)).unwrap();
        execute(&mut worker, &reserve(&scope, id, on_morning, morning)).unwrap();
        execute(&mut worker, &reserve(&scope, id, on_evening, evening)).unwrap();

        let events = execute(&mut worker, &cancel(&scope, id, morning, vec![])).unwrap();
        match &events[..] {
            [WorkerEvent::AvailabilityCancelled(e)] => {
                assert_eq!(e.released_jobs, vec![on_morning])
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert!(!worker.is_placed_on(on_morning));
        assert!(worker.is_placed_on(on_evening));
    }

    #[test]
    fn removal_lists_every_held_job_once() {
        let scope = test_scope();
        let mut worker = approved(&scope);
        let id = worker.id_typed();
        let morning = slot(1, Shift::Morning);
        let (invited, placed) = (JobId::new(), JobId::new());

        execute(&mut worker, &add(&scope, id, morning)).unwrap();
        execute(&mut worker, &invite(&scope, id, invited)).unwrap();
        execute(&mut worker, &reserve(&scope, id, placed, morning)).unwrap();

        let remove = WorkerCommand::RemoveWorker(RemoveWorker {
            scope: scope.clone(),
            worker_id: id,
            released_jobs: vec![placed],
            occurred_at: test_time(),
        });
        let events = execute(&mut worker, &remove).unwrap();
        match &events[..] {
            [WorkerEvent::WorkerRemoved(e)] => assert_eq!(e.released_jobs, vec![placed, invited]),
            other => panic!("unexpected events: {other:?}"),
        }
        assert!(worker.placements().is_empty());
    }

    #[test]
    fn releasing_a_placement_is_idempotent() {
        let scope = test_scope();
        let mut worker = approved(&scope);
        let id = worker.id_typed();
        let morning = slot(1, Shift::Morning);
        let job_id = JobId::new();

        execute(&mut worker, &add(&scope, id, morning)).unwrap();
        execute(&mut worker, &reserve(&scope, id, job_id, morning)).unwrap();

        let release = WorkerCommand::ReleasePlacement(ReleasePlacement {
            scope: scope.clone(),
            worker_id: id,
            job_id,
            occurred_at: test_time(),
        });
        assert_eq!(execute(&mut worker, &release).unwrap().len(), 1);
        assert!(execute(&mut worker, &release).unwrap().is_empty());
        assert!(!worker.is_placed_on(job_id));
    }

    #[test]
    fn profile_updates_merge_and_validate() {
        let scope = test_scope();
        let mut worker = approved(&scope);
        let id = worker.id_typed();
        let update = |changes: ProfileChanges| {
            WorkerCommand::UpdateProfile(UpdateProfile {
                scope: scope.clone(),
                worker_id: id,
                changes,
                occurred_at: test_time(),
            })
        };

        execute(
            &mut worker,
            &update(ProfileChanges {
                email: Some(" Ada.L@Example.com ".to_string()),
                department: Some("Logistics".to_string()),
                ..ProfileChanges::default()
            }),
        )
        .unwrap();
        assert_eq!(worker.profile().name, "Ada");
        assert_eq!(worker.profile().email, "ada.l@example.com");
        assert_eq!(worker.profile().department.as_deref(), Some("Logistics"));

        let unchanged = update(ProfileChanges {
            department: Some("Logistics".to_string()),
            ..ProfileChanges::default()
        });
        assert!(execute(&mut worker, &unchanged).unwrap().is_empty());

        let blank = update(ProfileChanges {
            name: Some("   ".to_string()),
            ..ProfileChanges::default()
        });
        assert!(matches!(worker.handle(&blank), Err(DomainError::Validation(_))));
    }

    #[derive(Debug, Clone)]
    enum SlotOp {
        Add(u32, usize),
        Cancel(u32, usize),
    }

    fn slot_op() -> impl Strategy<Value = SlotOp> {
        prop_oneof![
            (1u32..4, 0usize..3).prop_map(|(d, s)| SlotOp::Add(d, s)),
            (1u32..4, 0usize..3).prop_map(|(d, s)| SlotOp::Cancel(d, s)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: availability never holds a duplicate slot, and a successful
        /// cancel shrinks it by exactly one entry.
        #[test]
        fn availability_keeps_set_semantics(ops in prop::collection::vec(slot_op(), 1..40)) {
            let scope = test_scope();
            let mut worker = approved(&scope);
            let id = worker.id_typed();

            for op in ops {
                match op {
                    SlotOp::Add(d, s) => {
                        execute(&mut worker, &add(&scope, id, slot(d, Shift::ALL[s]))).unwrap();
                    }
                    SlotOp::Cancel(d, s) => {
                        let before = worker.availability().len();
                        let cmd = cancel(&scope, id, slot(d, Shift::ALL[s]), vec![]);
                        match execute(&mut worker, &cmd) {
                            Ok(_) => {
                                prop_assert_eq!(worker.availability().len(), before - 1);
                            }
                            Err(e) => {
                                prop_assert_eq!(e, DomainError::Rejected(Rejection::SlotNotFound));
                            }
                        }
                    }
                }

                let mut seen = worker.availability().to_vec();
                seen.sort();
                seen.dedup();
                prop_assert_eq!(seen.len(), worker.availability().len());
            }
        }
    }
}
