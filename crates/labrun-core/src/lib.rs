//! labrun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Processes
//! - Database
//! - Runtime specifics
//!
//! All types here represent the run lifecycle of labrun.

pub mod error;
pub mod ids;
pub mod run;
pub mod status;
pub mod validate;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::RunId;
pub use run::{Run, RunParams, RunUpdate, StartRun};
pub use status::RunStatus;
