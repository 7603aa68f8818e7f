//! Staffing matching engine.
//!
//! Organizations post shift jobs, approved workers get invited by
//! availability, and acceptances, declines and cancellations keep every
//! job's fill status consistent. All operations take an explicit
//! [`ActorScope`]; nothing is shared across organization scopes.

pub mod context;
pub mod dto;
pub mod engine;
pub mod error;
pub mod notify;

pub use context::{ActorScope, OwnerKind};
pub use dto::{
    CascadeReport, InvitationResponse, NewJob, NewWorker, WorkerSchedule, WorkerUpdate,
};
pub use engine::{EnvelopeBus, MatchingEngine};
pub use error::{ErrorKind, MatchError};
pub use notify::{
    Notification, NotificationDispatcher, NotifyError, Recipient, RecordingNotifier, TemplateKind,
    TracingNotifier,
};

pub use shiftmatch_core::{JobId, OrganizationScope, Rejection, Shift, ShiftSlot, WorkerId};
pub use shiftmatch_infra::{
    ActivityEntry, ActivityKind, EngineConfig, JobView, RetryPolicy, WorkerView,
};
pub use shiftmatch_staffing::InvitationPolicy;
