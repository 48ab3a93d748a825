//! Health and metrics handlers.

use std::sync::Arc;

use axum::{extract::State, http::header, http::StatusCode, response::IntoResponse, Json};

use crate::http::ApiError;
use crate::state::AppState;

/// Health check endpoint.
///
/// Reports `degraded` once the store writer has stopped, since supervised
/// runs can no longer record their outcome.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.writer_running() {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "degraded" })),
        )
    }
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let body = crate::metrics::collect_metrics(&state).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handlers::test_support::{body_json, body_string, shell_state};

    #[tokio::test]
    async fn test_health_ok() {
        let (state, _root) = shell_state("exit 0");
        let response = health_check(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_metrics_text() {
        let (state, _root) = shell_state("exit 0");
        let response = metrics_handler(State(state)).await.unwrap().into_response();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
        let body = body_string(response).await;
        assert!(body.contains("# TYPE labrun_runs_total gauge"));
    }
}
