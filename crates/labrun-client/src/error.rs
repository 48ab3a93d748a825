//! Error types for the labrun client.

use thiserror::Error;

/// Errors that can occur when using the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected the request.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The base URL cannot carry request paths.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    /// Returns true for a 409 reply, sent when a run's status is stale.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Api { status: 409, .. })
    }
}
