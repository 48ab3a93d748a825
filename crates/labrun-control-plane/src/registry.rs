//! Process Registry: live view of the processes started by this server.
//!
//! Entries exist only for runs launched in the current process lifetime.
//! After a restart the registry is empty and every unfinished run polls as
//! [`ProcessPoll::Unknown`].

use std::collections::HashMap;

use tokio::sync::{watch, RwLock, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tracing::debug;

use labrun_core::RunId;

/// Lifecycle of a supervised OS process, as published by its supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// Supervisor started, process not spawned yet.
    Starting,
    /// Process spawned.
    Running { pid: Option<u32> },
    /// Process exited. `None` when it was killed by a signal.
    Exited { code: Option<i32> },
    /// Output directory, log files or spawn failed; no process exists.
    LaunchFailed { reason: String },
}

impl ProcessState {
    /// Returns true once the state can no longer change.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Exited { .. } | Self::LaunchFailed { .. })
    }
}

/// Result of a non-blocking registry poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessPoll {
    Starting,
    Running,
    ExitedOk,
    ExitedError { code: Option<i32> },
    LaunchFailed { reason: String },
    /// No handle registered for this run.
    Unknown,
}

impl From<&ProcessState> for ProcessPoll {
    fn from(state: &ProcessState) -> Self {
        match state {
            ProcessState::Starting => Self::Starting,
            ProcessState::Running { .. } => Self::Running,
            ProcessState::Exited { code: Some(0) } => Self::ExitedOk,
            ProcessState::Exited { code } => Self::ExitedError { code: *code },
            ProcessState::LaunchFailed { reason } => Self::LaunchFailed {
                reason: reason.clone(),
            },
        }
    }
}

/// Human-readable description of a non-zero exit.
pub fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("process exited with code {}", code),
        None => "process terminated by signal".to_string(),
    }
}

/// Publishing side of a process handle, owned by the supervising task.
pub struct ProcessMonitor {
    tx: watch::Sender<ProcessState>,
}

impl ProcessMonitor {
    /// Create a monitor in the `Starting` state and the receiver for its handle.
    pub fn new() -> (Self, watch::Receiver<ProcessState>) {
        let (tx, rx) = watch::channel(ProcessState::Starting);
        (Self { tx }, rx)
    }

    pub fn running(&self, pid: Option<u32>) {
        self.tx.send_replace(ProcessState::Running { pid });
    }

    pub fn exited(&self, code: Option<i32>) {
        self.tx.send_replace(ProcessState::Exited { code });
    }

    pub fn launch_failed(&self, reason: impl Into<String>) {
        self.tx.send_replace(ProcessState::LaunchFailed {
            reason: reason.into(),
        });
    }
}

/// Reason reported when a supervisor stops without publishing an outcome.
const SUPERVISOR_LOST: &str = "supervisor stopped before the process finished";

/// Registry entry: the supervising task and its published process state.
pub struct ProcessHandle {
    state: watch::Receiver<ProcessState>,
    task: JoinHandle<()>,
}

impl ProcessHandle {
    pub fn new(state: watch::Receiver<ProcessState>, task: JoinHandle<()>) -> Self {
        Self { state, task }
    }

    /// Non-blocking view of the process.
    ///
    /// A supervisor that ended (panicked) without a final state reports a
    /// launch failure, so its run can still be finalized.
    pub fn poll(&self) -> ProcessPoll {
        let state = self.state.borrow();
        if !state.is_finished() && self.task.is_finished() {
            return ProcessPoll::LaunchFailed {
                reason: SUPERVISOR_LOST.to_string(),
            };
        }
        ProcessPoll::from(&*state)
    }

    fn is_live(&self) -> bool {
        !self.state.borrow().is_finished() && !self.task.is_finished()
    }
}

/// Write access to the registry held while a run is being created.
///
/// Polls block until the registration is completed or dropped, so a status
/// query never sees a freshly created run without its handle.
pub struct Registration<'a> {
    handles: RwLockWriteGuard<'a, HashMap<RunId, ProcessHandle>>,
}

impl Registration<'_> {
    /// Store the handle for `run_id`, returning the entry it replaced.
    pub fn insert(mut self, run_id: RunId, handle: ProcessHandle) -> Option<ProcessHandle> {
        debug!(run_id = %run_id, "Registering process handle");
        self.handles.insert(run_id, handle)
    }
}

/// Concurrency-safe map from run id to its process handle.
#[derive(Default)]
pub struct ProcessRegistry {
    handles: RwLock<HashMap<RunId, ProcessHandle>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the registry for a registration that is not known yet.
    pub async fn begin_registration(&self) -> Registration<'_> {
        Registration {
            handles: self.handles.write().await,
        }
    }

    /// Store the handle for `run_id`, returning the entry it replaced.
    pub async fn register(&self, run_id: RunId, handle: ProcessHandle) -> Option<ProcessHandle> {
        self.begin_registration().await.insert(run_id, handle)
    }

    /// Current process status without waiting for the process.
    pub async fn poll(&self, run_id: RunId) -> ProcessPoll {
        match self.handles.read().await.get(&run_id) {
            Some(handle) => handle.poll(),
            None => ProcessPoll::Unknown,
        }
    }

    /// Wait until the process of `run_id` finished (or failed to launch).
    ///
    /// Returns `None` when no handle is registered.
    pub async fn wait_for_exit(&self, run_id: RunId) -> Option<ProcessState> {
        let mut rx = self.handles.read().await.get(&run_id)?.state.clone();
        let finished = rx
            .wait_for(ProcessState::is_finished)
            .await
            .map(|state| state.clone());
        match finished {
            Ok(state) => Some(state),
            // Supervisor dropped its sender without finishing.
            Err(_) => Some(rx.borrow().clone()),
        }
    }

    /// Drop the handle of `run_id` once its outcome is persisted.
    pub async fn forget(&self, run_id: RunId) -> bool {
        let removed = self.handles.write().await.remove(&run_id).is_some();
        if removed {
            debug!(run_id = %run_id, "Forgot process handle");
        }
        removed
    }

    /// Number of tracked handles.
    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    /// Returns true if no handles are tracked.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of tracked processes that have not finished yet.
    pub async fn live_count(&self) -> usize {
        self.handles
            .read()
            .await
            .values()
            .filter(|h| h.is_live())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    /// A handle whose supervisor never finishes on its own.
    fn idle_handle() -> (ProcessMonitor, ProcessHandle) {
        let (monitor, rx) = ProcessMonitor::new();
        let task = tokio::spawn(std::future::pending::<()>());
        (monitor, ProcessHandle::new(rx, task))
    }

    #[tokio::test]
    async fn test_poll_unknown_without_entry() {
        let registry = ProcessRegistry::new();
        assert_eq!(registry.poll(RunId::new(1)).await, ProcessPoll::Unknown);
        assert!(registry.wait_for_exit(RunId::new(1)).await.is_none());
        assert!(!registry.forget(RunId::new(1)).await);
    }

    #[tokio::test]
    async fn test_poll_follows_published_state() {
        let registry = ProcessRegistry::new();
        let id = RunId::new(1);
        let (monitor, handle) = idle_handle();
        registry.register(id, handle).await;

        assert_eq!(registry.poll(id).await, ProcessPoll::Starting);
        monitor.running(Some(99));
        assert_eq!(registry.poll(id).await, ProcessPoll::Running);
        assert_eq!(registry.live_count().await, 1);

        monitor.exited(Some(5));
        assert_eq!(
            registry.poll(id).await,
            ProcessPoll::ExitedError { code: Some(5) }
        );
        assert_eq!(registry.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_exit_zero_and_launch_failure() {
        let registry = ProcessRegistry::new();
        let (ok_monitor, ok_handle) = idle_handle();
        let (bad_monitor, bad_handle) = idle_handle();
        registry.register(RunId::new(1), ok_handle).await;
        registry.register(RunId::new(2), bad_handle).await;

        ok_monitor.exited(Some(0));
        bad_monitor.launch_failed("No such file or directory");

        assert_eq!(registry.poll(RunId::new(1)).await, ProcessPoll::ExitedOk);
        assert_eq!(
            registry.poll(RunId::new(2)).await,
            ProcessPoll::LaunchFailed {
                reason: "No such file or directory".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_register_overwrites_previous_entry() {
        let registry = ProcessRegistry::new();
        let id = RunId::new(3);
        let (first, first_handle) = idle_handle();
        let (_second, second_handle) = idle_handle();

        first.exited(Some(1));
        assert!(registry.register(id, first_handle).await.is_none());
        assert!(registry.register(id, second_handle).await.is_some());

        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.poll(id).await, ProcessPoll::Starting);
    }

    #[tokio::test]
    async fn test_wait_for_exit_and_forget() {
        let registry = ProcessRegistry::new();
        let id = RunId::new(4);
        let (monitor, handle) = idle_handle();
        registry.register(id, handle).await;

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            monitor.running(Some(1));
            monitor.exited(Some(0));
        });

        let state = registry.wait_for_exit(id).await.unwrap();
        assert_eq!(state, ProcessState::Exited { code: Some(0) });

        assert!(registry.forget(id).await);
        assert!(registry.is_empty().await);
        assert_eq!(registry.poll(id).await, ProcessPoll::Unknown);
    }

    #[tokio::test]
    async fn test_poll_waits_for_pending_registration() {
        let registry = Arc::new(ProcessRegistry::new());
        let id = RunId::new(5);

        let registration = registry.begin_registration().await;
        let poller = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.poll(id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!poller.is_finished());

        let (_monitor, handle) = idle_handle();
        registration.insert(id, handle);
        assert_eq!(poller.await.unwrap(), ProcessPoll::Starting);
    }

    #[tokio::test]
    async fn test_supervisor_stopped_without_outcome() {
        let registry = ProcessRegistry::new();
        let id = RunId::new(6);
        let (monitor, rx) = ProcessMonitor::new();
        let task = tokio::spawn(async move {
            monitor.running(Some(1));
        });
        registry.register(id, ProcessHandle::new(rx, task)).await;

        // The sender is gone, so waiting returns the last published state.
        let state = registry.wait_for_exit(id).await.unwrap();
        assert_eq!(state, ProcessState::Running { pid: Some(1) });

        while registry.live_count().await > 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            registry.poll(id).await,
            ProcessPoll::LaunchFailed {
                reason: SUPERVISOR_LOST.to_string()
            }
        );
    }

    #[test]
    fn test_describe_exit() {
        assert_eq!(describe_exit(Some(5)), "process exited with code 5");
        assert_eq!(describe_exit(None), "process terminated by signal");
    }
}
