//! HTTP server for the control plane.
//!
//! Provides endpoints for:
//! - Starting runs (`POST /runs`, `POST /runs/start`)
//! - Run list and detail (`/runs`, `/runs/:id`)
//! - Reconciled status (`/runs/:id/status`, long-poll `/runs/:id/wait`)
//! - Logs and result files (`/runs/:id/log`, `/runs/:id/results/:file_name`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod error;
mod handlers;
pub mod responses;

pub use error::ApiError;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer for browser dashboards
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Run routes
        .route("/runs", post(handlers::create_run).get(handlers::list_runs))
        .route("/runs/start", post(handlers::create_run_form))
        .route("/runs/:id", get(handlers::get_run))
        .route("/runs/:id/status", get(handlers::get_run_status))
        .route("/runs/:id/wait", get(handlers::wait_run))
        .route("/runs/:id/log", get(handlers::get_run_log))
        .route("/runs/:id/results/:file_name", get(handlers::get_run_result))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
