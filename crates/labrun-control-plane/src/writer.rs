//! Store Writer: the single task that applies background run updates.
//!
//! Supervising tasks never touch the store directly. They send a
//! [`StoreCommand`] and await the reply, so updates from one supervisor are
//! applied in the order they were sent.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use labrun_core::{Run, RunId, RunUpdate};

use crate::store::{RunStore, StoreError};

/// Capacity of the command channel.
const COMMAND_BUFFER: usize = 256;

/// A partial update for one run, with the channel its result is sent back on.
pub struct StoreCommand {
    pub run_id: RunId,
    pub update: RunUpdate,
    pub reply: oneshot::Sender<Result<Run, StoreError>>,
}

/// Sending side of the store writer.
#[derive(Clone)]
pub struct StoreWriterHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreWriterHandle {
    /// Queue an update and wait for the writer to apply it.
    pub async fn apply(&self, run_id: RunId, update: RunUpdate) -> Result<Run, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreCommand {
                run_id,
                update,
                reply,
            })
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        rx.await.map_err(|_| StoreError::WriterClosed)?
    }
}

/// Spawn the writer loop. It exits once every handle has been dropped.
pub fn spawn_store_writer(store: Arc<dyn RunStore>) -> (StoreWriterHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<StoreCommand>(COMMAND_BUFFER);

    let task = tokio::spawn(async move {
        info!("Store writer started");
        while let Some(cmd) = rx.recv().await {
            let result = store.update(cmd.run_id, cmd.update).await;
            match &result {
                Ok(run) => debug!(
                    run_id = %run.id,
                    status = %run.status,
                    revision = run.revision,
                    "Run updated"
                ),
                Err(e) => debug!(run_id = %cmd.run_id, error = %e, "Run update rejected"),
            }
            // The supervisor may have gone away; the update is applied either way.
            cmd.reply.send(result).ok();
        }
        info!("Store writer finished (channel closed)");
    });

    (StoreWriterHandle { tx }, task)
}
