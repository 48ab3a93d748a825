//! Run launch, list, detail and status handlers.

use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Form, Json,
};
use tracing::{debug, info};

use labrun_core::{RunId, StartRun};

use crate::artifacts::list_artifacts;
use crate::error::TrackerError;
use crate::http::responses::{
    RunDetailResponse, RunResponse, RunStatusResponse, StartRunForm, StartRunRequest,
    StartRunResponse, WaitQuery,
};
use crate::http::ApiError;
use crate::state::AppState;

async fn start(state: &AppState, request: StartRun) -> Result<impl IntoResponse, ApiError> {
    let run_id = state.launcher.start_run(request).await?;
    info!(run_id = %run_id, "Run started via HTTP");
    Ok((StatusCode::CREATED, Json(StartRunResponse { run_id })))
}

/// Start a run from a JSON body.
pub async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    start(&state, request.into()).await
}

/// Start a run from form fields.
pub async fn create_run_form(
    State(state): State<Arc<AppState>>,
    Form(form): Form<StartRunForm>,
) -> Result<impl IntoResponse, ApiError> {
    start(&state, form.into()).await
}

/// List all runs, most recent first.
pub async fn list_runs(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let runs = state.store.list().await?;
    let response: Vec<RunResponse> = runs.iter().map(RunResponse::from).collect();
    Ok(Json(response))
}

/// Reconciled run record plus its output files.
///
/// Unlike the status endpoint, a stale run is still shown, flagged as such.
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<RunId>,
) -> Result<impl IntoResponse, ApiError> {
    let (run, stale) = match state.reconciler.status(run_id).await {
        Ok(run) => (run, false),
        Err(TrackerError::StaleStatus { .. }) => {
            let run = state
                .store
                .get(run_id)
                .await?
                .ok_or(TrackerError::NotFound(run_id))?;
            (run, true)
        }
        Err(e) => return Err(e.into()),
    };

    let files = match &run.output_directory {
        Some(dir) => list_artifacts(FsPath::new(dir)).await?,
        None => Vec::new(),
    };

    Ok(Json(RunDetailResponse {
        run: RunResponse::from(&run),
        files,
        stale,
    }))
}

/// Reconciled status of a run.
pub async fn get_run_status(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<RunId>,
) -> Result<impl IntoResponse, ApiError> {
    let run = state.reconciler.status(run_id).await?;
    Ok(Json(RunStatusResponse::from(&run)))
}

/// Reconciled status once the run's process has exited, or after the timeout.
///
/// Returns the current status either way; callers loop until it is terminal.
pub async fn wait_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<RunId>,
    Query(query): Query<WaitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let timeout = Duration::from_secs(query.timeout_secs.clamp(1, 300));
    if tokio::time::timeout(timeout, state.registry.wait_for_exit(run_id))
        .await
        .is_err()
    {
        debug!(run_id = %run_id, "Wait timed out with the process still running");
    }

    let run = state.reconciler.status(run_id).await?;
    Ok(Json(RunStatusResponse::from(&run)))
}
