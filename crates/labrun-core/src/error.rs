//! Core domain errors.

use thiserror::Error;

use crate::{RunId, RunStatus};

/// Core domain errors for labrun.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Run not found.
    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: RunStatus, to: RunStatus },

    /// The run reached a terminal status and can no longer change.
    #[error("Run {0} is finalized")]
    RunFinalized(RunId),

    /// Compare-and-swap update lost against a concurrent writer.
    #[error("Revision conflict: expected {expected}, found {actual}")]
    RevisionConflict { expected: u64, actual: u64 },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
