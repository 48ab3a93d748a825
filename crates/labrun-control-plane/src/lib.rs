//! labrun control plane.
//!
//! Tracks long-running research runs: each run is recorded in a [`store`],
//! launched as an external process by the [`launcher`], observed through the
//! [`registry`] and reconciled into a final status by the [`reconciler`].

pub mod artifacts;
pub mod config;
pub mod error;
pub mod http;
pub mod launcher;
pub mod metrics;
pub mod reconciler;
pub mod registry;
pub mod state;
pub mod store;
pub mod writer;

pub use config::Config;
pub use error::TrackerError;
pub use launcher::{LaunchConfig, LaunchError, RunLauncher};
pub use reconciler::StatusReconciler;
pub use registry::{ProcessPoll, ProcessRegistry, ProcessState};
pub use state::AppState;
pub use store::{MemoryRunStore, RunStore, SqliteRunStore, StoreError};
