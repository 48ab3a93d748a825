//! Run Store: persistent table of run records.
//!
//! Two implementations share the [`RunStore`] trait:
//! - [`SqliteRunStore`] - durable, the default for the server binary
//! - [`MemoryRunStore`] - ephemeral, used by tests and throwaway deployments

use async_trait::async_trait;
use thiserror::Error;

use labrun_core::{CoreError, Run, RunId, RunParams, RunUpdate};

mod memory;
mod sqlite;

pub use memory::MemoryRunStore;
pub use sqlite::SqliteRunStore;

/// Errors returned by a run store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A domain rule rejected the operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// SQLite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("Corrupt run record: {0}")]
    Corrupt(String),

    /// The connection lock was poisoned by a panicking writer.
    #[error("Store lock poisoned")]
    Poisoned,

    /// A blocking store task failed.
    #[error("Store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The store writer task is no longer running.
    #[error("Store writer stopped")]
    WriterClosed,
}

impl StoreError {
    /// The domain error behind this failure, if any.
    pub fn core(&self) -> Option<&CoreError> {
        match self {
            Self::Core(e) => Some(e),
            _ => None,
        }
    }

    /// True when the update lost against the run's lifecycle rules
    /// (the run is already terminal or moved past the requested status).
    pub fn is_lifecycle_conflict(&self) -> bool {
        matches!(
            self.core(),
            Some(CoreError::RunFinalized(_)) | Some(CoreError::InvalidStateTransition { .. })
        )
    }
}

/// Persistent table of runs.
///
/// Every operation is atomic for the single row it touches. Same-row updates
/// are last-writer-wins unless the update carries an expected revision.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new PENDING run and return it with its assigned id.
    async fn create(&self, params: RunParams) -> Result<Run, StoreError>;

    /// Fetch a run by id.
    async fn get(&self, id: RunId) -> Result<Option<Run>, StoreError>;

    /// Apply a partial update and return the updated run.
    async fn update(&self, id: RunId, update: RunUpdate) -> Result<Run, StoreError>;

    /// All runs, most recent first.
    async fn list(&self) -> Result<Vec<Run>, StoreError>;
}
