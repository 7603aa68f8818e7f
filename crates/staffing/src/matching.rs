//! Invitation candidate selection for a new job.
//!
//! Pure: callers pass the approved workers of the job's scope and get back the
//! ids to invite plus the policy that produced them.

use serde::{Deserialize, Serialize};

use shiftmatch_core::{ShiftSlot, WorkerId};

/// How the invitee list of a job was chosen.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationPolicy {
    /// Only workers with a slot matching the job were invited.
    Targeted,
    /// Nobody matched, so every approved worker in scope was invited.
    Broadcast,
}

impl InvitationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationPolicy::Targeted => "targeted",
            InvitationPolicy::Broadcast => "broadcast",
        }
    }
}

/// An approved worker considered for a job.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub worker_id: WorkerId,
    pub availability: &'a [ShiftSlot],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub policy: InvitationPolicy,
    pub invitees: Vec<WorkerId>,
}

/// Select invitees for a job on `slot`.
///
/// Workers available for the slot are invited if there are any. Otherwise all
/// candidates are invited when `broadcast_when_unavailable` is set, and nobody
/// when it is not. Input order is preserved and duplicate ids are dropped.
pub fn select_invitees<'a, I>(
    slot: &ShiftSlot,
    candidates: I,
    broadcast_when_unavailable: bool,
) -> Selection
where
    I: IntoIterator<Item = Candidate<'a>>,
{
    let mut available = Vec::new();
    let mut rest = Vec::new();

    for candidate in candidates {
        if available.contains(&candidate.worker_id) || rest.contains(&candidate.worker_id) {
            continue;
        }
        if candidate.availability.contains(slot) {
            available.push(candidate.worker_id);
        } else {
            rest.push(candidate.worker_id);
        }
    }

    if !available.is_empty() || !broadcast_when_unavailable {
        return Selection {
            policy: InvitationPolicy::Targeted,
            invitees: available,
        };
    }

    Selection {
        policy: InvitationPolicy::Broadcast,
        invitees: rest,
    }
}
