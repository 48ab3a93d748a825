//! Response types of the control plane API.

use serde::{Deserialize, Serialize};

use labrun_core::{RunId, RunStatus};

/// Request body for starting a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunBody {
    pub model: String,
    pub experiment: String,
    pub num_ideas: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartRunReply {
    pub run_id: RunId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorReply {
    pub error: String,
}

/// Reconciled status of a run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusView {
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

/// A run as listed by the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
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
}

/// Run detail with its output files.
#[derive(Debug, Clone, Deserialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: RunSummary,
    pub files: Vec<String>,
    #[serde(default)]
    pub stale: bool,
}
