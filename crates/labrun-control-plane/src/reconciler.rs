//! Status Reconciler: merges the persisted run record with the live process view.
//!
//! A status query never blocks on a running process. When the registry
//! reports that the process already finished but the row still says
//! PENDING/RUNNING, the reconciler writes the outcome itself; the supervisor's
//! own write then loses against the frozen terminal row and is dropped.

use std::sync::Arc;

use tracing::{debug, info, warn};

use labrun_core::{Run, RunId, RunStatus, RunUpdate};

use crate::error::TrackerError;
use crate::registry::{describe_exit, ProcessPoll, ProcessRegistry};
use crate::store::RunStore;

/// Answers status queries for runs.
pub struct StatusReconciler {
    store: Arc<dyn RunStore>,
    registry: Arc<ProcessRegistry>,
}

impl StatusReconciler {
    /// Create a new StatusReconciler.
    pub fn new(store: Arc<dyn RunStore>, registry: Arc<ProcessRegistry>) -> Self {
        Self { store, registry }
    }

    /// Current status of a run, finalizing it if its process has exited.
    ///
    /// Returns [`TrackerError::StaleStatus`] for an active run that has no
    /// tracked process, which happens for runs started before a restart.
    pub async fn status(&self, run_id: RunId) -> Result<Run, TrackerError> {
        let run = self
            .store
            .get(run_id)
            .await?
            .ok_or(TrackerError::NotFound(run_id))?;

        if run.is_terminal() {
            self.registry.forget(run_id).await;
            return Ok(run);
        }

        match self.registry.poll(run_id).await {
            ProcessPoll::Starting | ProcessPoll::Running => Ok(run),
            ProcessPoll::ExitedOk => self.finish(run, RunUpdate::succeeded(0), true).await,
            ProcessPoll::ExitedError { code } => {
                self.finish(run, RunUpdate::failed(describe_exit(code), code), true)
                    .await
            }
            ProcessPoll::LaunchFailed { reason } => {
                self.finish(run, RunUpdate::failed(reason, None), false).await
            }
            ProcessPoll::Unknown => {
                // Supervisors forget their handle only after persisting the outcome.
                let current = self
                    .store
                    .get(run_id)
                    .await?
                    .ok_or(TrackerError::NotFound(run_id))?;
                if current.is_terminal() {
                    return Ok(current);
                }

                warn!(run_id = %run_id, status = %current.status, "No process tracked for active run");
                Err(TrackerError::StaleStatus {
                    run_id,
                    status: current.status,
                })
            }
        }
    }

    /// Persist the outcome of a finished process.
    ///
    /// `spawned` is true when a process actually ran, in which case a PENDING
    /// row passes through RUNNING first.
    async fn finish(
        &self,
        run: Run,
        outcome: RunUpdate,
        spawned: bool,
    ) -> Result<Run, TrackerError> {
        let run_id = run.id;

        if spawned && run.status == RunStatus::Pending {
            if let Err(e) = self.store.update(run_id, RunUpdate::running(None)).await {
                if !e.is_lifecycle_conflict() {
                    return Err(e.into());
                }
            }
        }

        let run = match self.store.update(run_id, outcome).await {
            Ok(run) => {
                info!(run_id = %run_id, status = %run.status, "Run finalized by status query");
                run
            }
            Err(e) if e.is_lifecycle_conflict() => {
                // The supervisor got there first.
                debug!(run_id = %run_id, "Run already finalized, re-reading");
                self.store
                    .get(run_id)
                    .await?
                    .ok_or(TrackerError::NotFound(run_id))?
            }
            Err(e) => return Err(e.into()),
        };

        self.registry.forget(run_id).await;
        Ok(run)
    }
}
