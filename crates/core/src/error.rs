//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Stable business-rule refusals raised by the job and worker aggregates.
///
/// These are terminal for the triggering request and are never retried.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The job already has as many accepted workers as it requires.
    JobAlreadyFilled,
    /// The worker has no availability slot matching the job's date and shift.
    NotAvailable,
    /// The worker is already on the job's accepted list.
    AlreadyAccepted,
    /// Neither side records an open invitation for this pair.
    NotInvited,
    /// The worker has no availability slot for the given date and shift.
    SlotNotFound,
    /// The worker has not been approved by the organization yet.
    WorkerNotApproved,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::JobAlreadyFilled => "job_already_filled",
            Rejection::NotAvailable => "not_available",
            Rejection::AlreadyAccepted => "already_accepted",
            Rejection::NotInvited => "not_invited",
            Rejection::SlotNotFound => "slot_not_found",
            Rejection::WorkerNotApproved => "worker_not_approved",
        }
    }
}

impl core::fmt::Display for Rejection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Rejection::JobAlreadyFilled => "job is already filled",
            Rejection::NotAvailable => "worker is not available for this shift",
            Rejection::AlreadyAccepted => "worker has already accepted this job",
            Rejection::NotInvited => "worker has no open invitation for this job",
            Rejection::SlotNotFound => "availability slot not found",
            Rejection::WorkerNotApproved => "worker is not approved",
        };
        f.write_str(msg)
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, rule refusals). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflicting state transition (e.g. approving twice).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A business rule refused the command.
    #[error("{0}")]
    Rejected(Rejection),

    /// Authorization failure at the domain boundary (scope missing or mismatched).
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn rejected(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}

impl From<Rejection> for DomainError {
    fn from(value: Rejection) -> Self {
        Self::Rejected(value)
    }
}
