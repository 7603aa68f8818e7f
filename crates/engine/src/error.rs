//! Externally visible error type of the matching engine.

use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use thiserror::Error;

use shiftmatch_core::{DomainError, Rejection, SlotParseError};
use shiftmatch_infra::DispatchError;

/// Coarse error taxonomy, stable across releases.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Unauthorized,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("job not found")]
    JobNotFound,

    #[error("worker not found")]
    WorkerNotFound,

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("conflict: {0}")]
    Conflict(String),

    /// A business rule refused the request.
    #[error("{0}")]
    Rejected(Rejection),

    /// Storage failure or retry budget exhausted.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchError::JobNotFound | MatchError::WorkerNotFound => ErrorKind::NotFound,
            MatchError::Rejected(Rejection::SlotNotFound) => ErrorKind::NotFound,
            MatchError::Rejected(_) | MatchError::Conflict(_) => ErrorKind::Conflict,
            MatchError::InvalidDate(_) | MatchError::Validation(_) => ErrorKind::Validation,
            MatchError::Unauthorized => ErrorKind::Unauthorized,
            MatchError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable snake_case code, e.g. `job_already_filled`.
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::JobNotFound => "job_not_found",
            MatchError::WorkerNotFound => "worker_not_found",
            MatchError::InvalidDate(_) => "invalid_date",
            MatchError::Validation(_) => "validation_error",
            MatchError::Unauthorized => "unauthorized",
            MatchError::Conflict(_) => "conflict",
            MatchError::Rejected(r) => r.as_str(),
            MatchError::Internal(_) => "internal",
        }
    }

    /// `{"error": code, "kind": kind, "message": msg}`
    pub fn to_json(&self) -> JsonValue {
        json!({
            "error": self.code(),
            "kind": self.kind().as_str(),
            "message": self.to_string(),
        })
    }

    /// Map a dispatch failure, using `missing` for the aggregate's not-found case.
    pub(crate) fn from_dispatch(err: DispatchError, missing: MatchError) -> Self {
        match err {
            DispatchError::Domain(domain) => Self::from_domain(domain, missing),
            DispatchError::ScopeIsolation(_) => MatchError::Unauthorized,
            DispatchError::Concurrency(msg) => MatchError::Internal(msg),
            DispatchError::RetriesExhausted { attempts, last } => {
                MatchError::Internal(format!("update abandoned after {attempts} attempts: {last}"))
            }
            DispatchError::Deserialize(msg) => MatchError::Internal(msg),
            DispatchError::Store(e) => MatchError::Internal(e.to_string()),
        }
    }

    pub(crate) fn from_domain(err: DomainError, missing: MatchError) -> Self {
        match err {
            DomainError::NotFound => missing,
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                MatchError::Validation(msg)
            }
            DomainError::Conflict(msg) => MatchError::Conflict(msg),
            DomainError::Rejected(r) => MatchError::Rejected(r),
            DomainError::Unauthorized => MatchError::Unauthorized,
            DomainError::InvariantViolation(msg) => MatchError::Internal(msg),
        }
    }
}

impl From<Rejection> for MatchError {
    fn from(value: Rejection) -> Self {
        MatchError::Rejected(value)
    }
}

impl From<SlotParseError> for MatchError {
    fn from(value: SlotParseError) -> Self {
        match value {
            SlotParseError::InvalidDate(raw) => MatchError::InvalidDate(raw),
            SlotParseError::InvalidShift(raw) => {
                MatchError::Validation(format!("unknown shift '{raw}'"))
            }
        }
    }
}
