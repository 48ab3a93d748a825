//! HTTP request and response types.

use serde::{Deserialize, Serialize};

use labrun_core::{Run, RunId, RunStatus, StartRun};

use crate::artifacts::LogStream;

fn default_num_ideas() -> i64 {
    1
}

// ============================================================================
// Launch types
// ============================================================================

/// JSON body for `POST /runs`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    pub model: String,
    pub experiment: String,
    #[serde(default = "default_num_ideas")]
    pub num_ideas: i64,
    #[serde(default)]
    pub template: Option<String>,
}

impl From<StartRunRequest> for StartRun {
    fn from(req: StartRunRequest) -> Self {
        let start = StartRun::new(req.model, req.experiment, req.num_ideas);
        match req.template {
            Some(template) => start.with_template(template),
            None => start,
        }
    }
}

/// Form body for `POST /runs/start`, as posted by a plain HTML form.
#[derive(Debug, Deserialize)]
pub struct StartRunForm {
    pub model: String,
    pub experiment: String,
    #[serde(default = "default_num_ideas")]
    pub num_ideas: i64,
}

impl From<StartRunForm> for StartRun {
    fn from(form: StartRunForm) -> Self {
        StartRun::new(form.model, form.experiment, form.num_ideas)
    }
}

/// Response body for a started run.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    pub run_id: RunId,
}

// ============================================================================
// Error types
// ============================================================================

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error response for an active run without a tracked process.
#[derive(Debug, Serialize)]
pub struct StaleStatusResponse {
    pub error: String,
    pub status: RunStatus,
    pub stale: bool,
}

// ============================================================================
// Run types
// ============================================================================

/// A run record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub run_id: RunId,
    pub status: RunStatus,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub model_name: String,
    pub experiment_name: String,
    pub num_ideas: u32,
    pub template_slug: String,
    pub output_directory: Option<String>,
    pub error_message: Option<String>,
    pub exit_code: Option<i32>,
    pub pid: Option<u32>,
    pub revision: u64,
}

impl From<&Run> for RunResponse {
    fn from(run: &Run) -> Self {
        Self {
            run_id: run.id,
            status: run.status,
            created_at: run.created_at.to_rfc3339(),
            updated_at: run.updated_at.to_rfc3339(),
            started_at: run.started_at.map(|t| t.to_rfc3339()),
            finished_at: run.finished_at.map(|t| t.to_rfc3339()),
            model_name: run.model_name.clone(),
            experiment_name: run.experiment_name.clone(),
            num_ideas: run.num_ideas,
            template_slug: run.template_slug.clone(),
            output_directory: run.output_directory.clone(),
            error_message: run.error_message.clone(),
            exit_code: run.exit_code,
            pid: run.pid,
            revision: run.revision,
        }
    }
}

/// Run detail: the record plus the files in its output directory.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetailResponse {
    #[serde(flatten)]
    pub run: RunResponse,
    pub files: Vec<String>,
    /// True when the stored status could not be checked against a process.
    pub stale: bool,
}

/// Reconciled status of a run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusResponse {
    pub run_id: RunId,
    pub status: RunStatus,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub output_directory: Option<String>,
    pub exit_code: Option<i32>,
    pub error_message: Option<String>,
}

impl From<&Run> for RunStatusResponse {
    fn from(run: &Run) -> Self {
        Self {
            run_id: run.id,
            status: run.status,
            created_at: run.created_at.to_rfc3339(),
            updated_at: run.updated_at.to_rfc3339(),
            started_at: run.started_at.map(|t| t.to_rfc3339()),
            finished_at: run.finished_at.map(|t| t.to_rfc3339()),
            output_directory: run.output_directory.clone(),
            exit_code: run.exit_code,
            error_message: run.error_message.clone(),
        }
    }
}

fn default_wait_secs() -> u64 {
    30
}

/// Query string of the wait endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitQuery {
    /// Seconds to hold the request open, clamped to 1..=300.
    #[serde(default = "default_wait_secs")]
    pub timeout_secs: u64,
}

/// Query string of the log endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub stream: LogStream,
}
