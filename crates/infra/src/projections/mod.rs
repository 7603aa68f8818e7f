//! Read-model projections.
//!
//! Projections consume committed envelopes and build query-optimized views.
//! All projections are:
//! - **Rebuildable**: can be reconstructed from the event store's streams
//! - **Scope-isolated**: data is partitioned by organization scope
//! - **Idempotent**: safe for at-least-once delivery (per-stream cursors)

use thiserror::Error;

pub mod cursor_store;
pub mod job_board;
pub mod worker_directory;

pub use cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
pub use job_board::{JobBoardProjection, JobView};
pub use worker_directory::{WorkerDirectoryProjection, WorkerView};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("scope isolation violation: {0}")]
    ScopeIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Decide whether an envelope at `seq` should be applied on top of cursor `last`.
///
/// `Ok(false)` for duplicates/replays, an error for gaps.
pub(crate) fn should_apply(last: u64, seq: u64) -> Result<bool, ProjectionError> {
    if seq == 0 {
        return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
    }
    if seq <= last {
        return Ok(false);
    }
    if seq != last + 1 {
        return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
    }
    Ok(true)
}
