//! Mapping of tracker failures onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::artifacts::ArtifactError;
use crate::error::TrackerError;
use crate::http::responses::{ErrorResponse, StaleStatusResponse};
use crate::store::StoreError;

/// Error returned by HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    Tracker(TrackerError),
    Artifact(ArtifactError),
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        Self::Tracker(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Tracker(err.into())
    }
}

impl From<ArtifactError> for ApiError {
    fn from(err: ArtifactError) -> Self {
        Self::Artifact(err)
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Tracker(TrackerError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Tracker(TrackerError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Tracker(TrackerError::StaleStatus { .. }) => StatusCode::CONFLICT,
            Self::Tracker(TrackerError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Artifact(ArtifactError::InvalidName(_) | ArtifactError::Escapes(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Artifact(ArtifactError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Artifact(ArtifactError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Tracker(e) => e.to_string(),
            Self::Artifact(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.message();

        if status.is_server_error() {
            error!(error = %message, "Request failed");
        }

        match self {
            Self::Tracker(TrackerError::StaleStatus {
                status: run_status, ..
            }) => (
                status,
                Json(StaleStatusResponse {
                    error: message,
                    status: run_status,
                    stale: true,
                }),
            )
                .into_response(),
            _ => (status, Json(ErrorResponse { error: message })).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use labrun_core::{CoreError, RunId, RunStatus};

    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                ApiError::from(TrackerError::Validation(CoreError::InvalidInput("x".into()))),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(TrackerError::NotFound(RunId::new(1))),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(TrackerError::StaleStatus {
                    run_id: RunId::new(1),
                    status: RunStatus::Running,
                }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(StoreError::WriterClosed),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from(ArtifactError::Escapes("../x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(ArtifactError::NotFound("x".into())),
                StatusCode::NOT_FOUND,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_store_not_found_maps_to_404() {
        let err = ApiError::from(StoreError::Core(CoreError::RunNotFound(RunId::new(3))));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
