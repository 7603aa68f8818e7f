//! Job aggregate and invitation candidate selection.

pub mod job;
pub mod matching;

pub use job::{
    AcceptInvitation, CreateJob, DeclineInvitation, DeleteJob, InvitationAccepted,
    InvitationDeclined, InviteWorkers, Job, JobCommand, JobCreated, JobDeleted, JobDetails,
    JobEvent, ReleaseReason, ReleaseWorker, WorkerReleased, WorkersInvited,
};
pub use matching::{Candidate, InvitationPolicy, Selection, select_invitees};
