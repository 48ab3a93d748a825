//! In-memory run store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use labrun_core::{CoreError, Run, RunId, RunParams, RunUpdate};

use super::{RunStore, StoreError};

struct Inner {
    runs: BTreeMap<RunId, Run>,
    last_id: i64,
}

/// Run store backed by a map. Contents are lost when the process exits.
pub struct MemoryRunStore {
    inner: RwLock<Inner>,
}

impl MemoryRunStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                runs: BTreeMap::new(),
                last_id: 0,
            }),
        }
    }

    /// Get the number of stored runs.
    pub async fn len(&self) -> usize {
        self.inner.read().await.runs.len()
    }

    /// Returns true if no runs are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, params: RunParams) -> Result<Run, StoreError> {
        let mut inner = self.inner.write().await;
        inner.last_id += 1;
        let id = RunId::new(inner.last_id);
        let run = Run::new(id, params, Utc::now());
        inner.runs.insert(id, run.clone());
        Ok(run)
    }

    async fn get(&self, id: RunId) -> Result<Option<Run>, StoreError> {
        Ok(self.inner.read().await.runs.get(&id).cloned())
    }

    async fn update(&self, id: RunId, update: RunUpdate) -> Result<Run, StoreError> {
        let mut inner = self.inner.write().await;
        let run = inner
            .runs
            .get_mut(&id)
            .ok_or(CoreError::RunNotFound(id))?;
        run.apply(&update, Utc::now())?;
        Ok(run.clone())
    }

    async fn list(&self) -> Result<Vec<Run>, StoreError> {
        Ok(self.inner.read().await.runs.values().rev().cloned().collect())
    }
}
