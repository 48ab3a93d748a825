//! Client library for the labrun control plane.
//!
//! Wraps the HTTP API used to start runs, poll their status and fetch logs
//! and result files.

pub mod error;
pub mod http;
pub mod types;

pub use error::ClientError;
pub use http::LabrunClient;
pub use types::{RunDetail, RunStatusView, RunSummary};
