//! Worker directory domain module (event-sourced).
//!
//! Business rules for workers: registration, approval, the availability
//! calendar, the worker-side list of open job invitations and the placements
//! the worker holds on accepted jobs. Pure deterministic domain logic (no IO,
//! no storage).

pub mod worker;

pub use worker::{
    AddAvailability, ApproveWorker, AvailabilityAdded, AvailabilityCancelled, CancelAvailability,
    ClearInvitation, InvitationCleared, InvitationRecorded, Placement, PlacementReleased,
    PlacementReserved, ProfileChanges, ProfileUpdated, PushTokenSet, RecordInvitation,
    RegisterWorker, ReleasePlacement, RemoveWorker, ReservePlacement, SetPushToken, UpdateProfile,
    Worker, WorkerApproved, WorkerCommand, WorkerEvent, WorkerProfile, WorkerRegistered,
    WorkerRemoved, is_valid_push_token,
};
