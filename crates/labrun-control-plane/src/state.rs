//! Shared application state.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::launcher::{LaunchConfig, RunLauncher};
use crate::reconciler::StatusReconciler;
use crate::registry::ProcessRegistry;
use crate::store::RunStore;
use crate::writer::spawn_store_writer;

/// Shared application state.
pub struct AppState {
    /// Persistent run records.
    pub store: Arc<dyn RunStore>,

    /// Processes started by this server, indexed by RunId.
    pub registry: Arc<ProcessRegistry>,

    /// Starts new runs.
    pub launcher: RunLauncher,

    /// Answers status queries.
    pub reconciler: StatusReconciler,

    /// Store writer task; lives as long as the state.
    writer_task: JoinHandle<()>,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    ///
    /// Spawns the store writer, so this must run inside a tokio runtime.
    pub fn new(store: Arc<dyn RunStore>, launch: LaunchConfig) -> Arc<Self> {
        let registry = Arc::new(ProcessRegistry::new());
        let (writer, writer_task) = spawn_store_writer(store.clone());
        let launcher = RunLauncher::new(store.clone(), registry.clone(), writer, launch);
        let reconciler = StatusReconciler::new(store.clone(), registry.clone());

        Arc::new(Self {
            store,
            registry,
            launcher,
            reconciler,
            writer_task,
        })
    }

    /// Returns true while the store writer is accepting updates.
    pub fn writer_running(&self) -> bool {
        !self.writer_task.is_finished()
    }
}
