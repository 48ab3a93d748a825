//! Tracker errors surfaced to callers of the launcher and reconciler.

use thiserror::Error;

use labrun_core::{CoreError, RunId, RunStatus};

use crate::store::StoreError;

/// Errors returned synchronously by the run lifecycle tracker.
///
/// Failures that happen after a run's supervising task started are recorded
/// on the run itself and never show up here.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Bad launch parameters; no run was created.
    #[error("Validation error: {0}")]
    Validation(CoreError),

    /// Unknown run id.
    #[error("Run not found: {0}")]
    NotFound(RunId),

    /// The store says the run is active but no process is tracked for it,
    /// typically because the server restarted while it was running.
    #[error("Status of run {run_id} is stale: stored as {status} but no process is tracked")]
    StaleStatus { run_id: RunId, status: RunStatus },

    /// Run store failure.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TrackerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Core(CoreError::RunNotFound(id)) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}
