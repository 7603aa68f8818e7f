use serde::{Deserialize, Serialize};

use shiftmatch_core::{JobId, ShiftSlot, WorkerId};
use shiftmatch_infra::JobView;
use shiftmatch_workforce::{ProfileChanges, WorkerProfile};

// -------------------------
// Requests
// -------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewWorker {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
}

impl From<NewWorker> for WorkerProfile {
    fn from(value: NewWorker) -> Self {
        WorkerProfile {
            name: value.name,
            email: value.email,
            phone: value.phone,
            role: value.role,
            department: value.department,
        }
    }
}

/// Profile edit. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
}

impl From<WorkerUpdate> for ProfileChanges {
    fn from(value: WorkerUpdate) -> Self {
        ProfileChanges {
            name: value.name,
            email: value.email,
            phone: value.phone,
            role: value.role,
            department: value.department,
        }
    }
}

/// Job posting. `date` is `YYYY-MM-DD` or an RFC 3339 timestamp (truncated to
/// its UTC day).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewJob {
    pub date: String,
    pub shift: String,
    pub workers_required: u32,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationResponse {
    Accept,
    Decline,
}

impl InvitationResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationResponse::Accept => "accept",
            InvitationResponse::Decline => "decline",
        }
    }
}

// -------------------------
// Responses
// -------------------------

/// Jobs a cascade actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub affected_job_count: usize,
    pub affected_jobs: Vec<JobId>,
}

impl CascadeReport {
    pub fn new(affected_jobs: Vec<JobId>) -> Self {
        Self {
            affected_job_count: affected_jobs.len(),
            affected_jobs,
        }
    }
}

/// Availability-status view of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSchedule {
    pub worker_id: WorkerId,
    pub availability: Vec<ShiftSlot>,
    pub invited_jobs: Vec<JobView>,
    pub accepted_jobs: Vec<JobView>,
}
