//! Run record, launch parameters and partial updates.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::validate::{validate_experiment_name, validate_model_name, validate_num_ideas};
use crate::{CoreError, RunId, RunStatus};

/// Raw launch request, as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRun {
    pub model_name: String,
    pub experiment_name: String,
    pub num_ideas: i64,
    /// Template to run against; defaults to the experiment name.
    pub template_slug: Option<String>,
}

impl StartRun {
    /// Create a request without an explicit template.
    pub fn new(
        model_name: impl Into<String>,
        experiment_name: impl Into<String>,
        num_ideas: i64,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            experiment_name: experiment_name.into(),
            num_ideas,
            template_slug: None,
        }
    }

    /// Builder method to set the template slug.
    pub fn with_template(mut self, template_slug: impl Into<String>) -> Self {
        self.template_slug = Some(template_slug.into());
        self
    }

    /// Validate the request into launch parameters.
    pub fn validate(self) -> Result<RunParams, CoreError> {
        validate_model_name(&self.model_name)?;
        validate_experiment_name(&self.experiment_name)?;
        let num_ideas = validate_num_ideas(self.num_ideas)?;

        let template_slug = match self.template_slug {
            Some(slug) if !slug.is_empty() => {
                validate_experiment_name(&slug)
                    .map_err(|e| CoreError::InvalidInput(format!("template: {}", e)))?;
                slug
            }
            _ => self.experiment_name.clone(),
        };

        Ok(RunParams {
            model_name: self.model_name,
            experiment_name: self.experiment_name,
            num_ideas,
            template_slug,
        })
    }
}

/// Validated launch parameters. Only obtainable through [`StartRun::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    pub model_name: String,
    pub experiment_name: String,
    pub num_ideas: u32,
    pub template_slug: String,
}

/// A Run is one invocation of the external task and its tracked lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Store-assigned identifier.
    pub id: RunId,

    /// Current run status.
    pub status: RunStatus,

    /// When the run was recorded.
    pub created_at: DateTime<Utc>,

    /// Last mutation time. Strictly increasing.
    pub updated_at: DateTime<Utc>,

    /// When the external process was spawned.
    pub started_at: Option<DateTime<Utc>>,

    /// When the run reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,

    pub model_name: String,
    pub experiment_name: String,
    pub num_ideas: u32,
    pub template_slug: String,

    /// Directory holding logs and artifacts. Set before the process starts.
    pub output_directory: Option<String>,

    /// Error message if run failed.
    pub error_message: Option<String>,

    /// Exit code of the external process, once observed.
    pub exit_code: Option<i32>,

    /// OS process id of the external process.
    pub pid: Option<u32>,

    /// Incremented by one on every mutation.
    pub revision: u64,
}

impl Run {
    /// Create a new PENDING run with the given store-assigned id.
    pub fn new(id: RunId, params: RunParams, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: RunStatus::Pending,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            model_name: params.model_name,
            experiment_name: params.experiment_name,
            num_ideas: params.num_ideas,
            template_slug: params.template_slug,
            output_directory: None,
            error_message: None,
            exit_code: None,
            pid: None,
            revision: 0,
        }
    }

    /// Check if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a partial update, enforcing the lifecycle invariants.
    ///
    /// Terminal runs are frozen. The update is all-or-nothing: on error the
    /// run is left untouched.
    pub fn apply(&mut self, update: &RunUpdate, now: DateTime<Utc>) -> Result<(), CoreError> {
        if self.is_terminal() {
            return Err(CoreError::RunFinalized(self.id));
        }

        if let Some(expected) = update.expected_revision {
            if expected != self.revision {
                return Err(CoreError::RevisionConflict {
                    expected,
                    actual: self.revision,
                });
            }
        }

        if let Some(next) = update.status {
            if next != self.status && !self.status.can_transition_to(next) {
                return Err(CoreError::InvalidStateTransition {
                    from: self.status,
                    to: next,
                });
            }
        }

        if let (Some(current), Some(requested)) =
            (&self.output_directory, &update.output_directory)
        {
            if current != requested {
                return Err(CoreError::InvalidInput(format!(
                    "output directory of run {} is already set to '{}'",
                    self.id, current
                )));
            }
        }

        if let Some(next) = update.status {
            if next == RunStatus::Running && self.started_at.is_none() {
                self.started_at = Some(now);
            }
            if next.is_terminal() {
                self.finished_at = Some(now);
            }
            self.status = next;
        }
        if let Some(dir) = &update.output_directory {
            self.output_directory = Some(dir.clone());
        }
        if let Some(message) = &update.error_message {
            self.error_message = Some(message.clone());
        }
        if let Some(code) = update.exit_code {
            self.exit_code = Some(code);
        }
        if let Some(pid) = update.pid {
            self.pid = Some(pid);
        }

        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        };
        self.revision += 1;

        Ok(())
    }
}

/// Partial update of a Run. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub output_directory: Option<String>,
    pub error_message: Option<String>,
    pub exit_code: Option<i32>,
    pub pid: Option<u32>,
    /// When set, the update only applies if the run is still at this revision.
    pub expected_revision: Option<u64>,
}

impl RunUpdate {
    /// Record the run's output directory.
    pub fn output_directory(dir: impl Into<String>) -> Self {
        Self {
            output_directory: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Mark the run as running.
    pub fn running(pid: Option<u32>) -> Self {
        Self {
            status: Some(RunStatus::Running),
            pid,
            ..Self::default()
        }
    }

    /// Mark the run as successfully completed.
    pub fn succeeded(exit_code: i32) -> Self {
        Self {
            status: Some(RunStatus::Success),
            exit_code: Some(exit_code),
            ..Self::default()
        }
    }

    /// Mark the run as failed.
    pub fn failed(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            status: Some(RunStatus::Failed),
            error_message: Some(message.into()),
            exit_code,
            ..Self::default()
        }
    }

    /// Builder method to guard the update with a revision check.
    pub fn if_revision(mut self, revision: u64) -> Self {
        self.expected_revision = Some(revision);
        self
    }
}
