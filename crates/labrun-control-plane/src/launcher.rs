//! Run Launcher: creates the run record and supervises its external process.
//!
//! `start_run` returns as soon as the run row exists. Everything that touches
//! the filesystem or spawns a process happens in a supervising task, whose
//! failures are recorded on the run (FAILED + error message) instead of being
//! returned to a caller that has already moved on.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use labrun_core::{RunId, RunParams, RunUpdate, StartRun};

use crate::artifacts::{STDERR_LOG, STDOUT_LOG};
use crate::error::TrackerError;
use crate::registry::{describe_exit, ProcessHandle, ProcessMonitor, ProcessRegistry};
use crate::store::{RunStore, StoreError};
use crate::writer::StoreWriterHandle;

/// Environment variable carrying the run id to the external process.
pub const RUN_ID_ENV: &str = "LABRUN_RUN_ID";

/// Environment variable carrying the output directory to the external process.
pub const OUTPUT_DIR_ENV: &str = "LABRUN_OUTPUT_DIR";

/// How the external task is invoked.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Root directory holding one directory per experiment.
    pub results_root: PathBuf,

    /// Executable to run.
    pub program: String,

    /// Arguments placed before the run parameters (the script path).
    pub script_args: Vec<String>,

    /// Working directory of the external process (inherited if unset).
    pub working_dir: Option<PathBuf>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            results_root: PathBuf::from("results"),
            program: "python".to_string(),
            script_args: vec!["launch_scientist.py".to_string()],
            working_dir: None,
        }
    }
}

impl LaunchConfig {
    /// Output directory of a run: `<results_root>/<experiment>/run_<id>`.
    pub fn run_directory(&self, experiment_name: &str, run_id: RunId) -> PathBuf {
        self.results_root
            .join(experiment_name)
            .join(format!("run_{}", run_id))
    }

    /// Full argument list passed to `program`.
    ///
    /// The flag names and their order are what the external script parses.
    pub fn command_args(&self, params: &RunParams) -> Vec<String> {
        let mut args = self.script_args.clone();
        args.extend([
            "--model".to_string(),
            params.model_name.clone(),
            "--experiment".to_string(),
            params.experiment_name.clone(),
            "--num-ideas".to_string(),
            params.num_ideas.to_string(),
        ]);
        args
    }
}

/// Failures of a supervising task before the process is running.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to prepare '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to record launch: {0}")]
    Store(#[from] StoreError),
}

/// Starts runs and hands their processes to supervising tasks.
pub struct RunLauncher {
    store: Arc<dyn RunStore>,
    registry: Arc<ProcessRegistry>,
    writer: StoreWriterHandle,
    config: Arc<LaunchConfig>,
}

impl RunLauncher {
    /// Create a new RunLauncher.
    pub fn new(
        store: Arc<dyn RunStore>,
        registry: Arc<ProcessRegistry>,
        writer: StoreWriterHandle,
        config: LaunchConfig,
    ) -> Self {
        Self {
            store,
            registry,
            writer,
            config: Arc::new(config),
        }
    }

    /// Validate the request, record a PENDING run and start supervising it.
    ///
    /// Returns once the run row exists; the process is started in the background.
    /// The row and its process handle become visible to status queries together.
    pub async fn start_run(&self, request: StartRun) -> Result<RunId, TrackerError> {
        let params = request.validate().map_err(TrackerError::Validation)?;
        let registration = self.registry.begin_registration().await;
        let run = self.store.create(params.clone()).await?;
        let run_id = run.id;

        info!(
            run_id = %run_id,
            model = %params.model_name,
            experiment = %params.experiment_name,
            num_ideas = params.num_ideas,
            "Run created"
        );

        let (monitor, state) = ProcessMonitor::new();
        let supervisor = Supervisor {
            run_id,
            params,
            config: self.config.clone(),
            writer: self.writer.clone(),
            registry: self.registry.clone(),
            monitor,
        };
        let task = tokio::spawn(supervisor.run());

        registration.insert(run_id, ProcessHandle::new(state, task));

        Ok(run_id)
    }
}

/// Owns one run's process from directory creation to exit.
struct Supervisor {
    run_id: RunId,
    params: RunParams,
    config: Arc<LaunchConfig>,
    writer: StoreWriterHandle,
    registry: Arc<ProcessRegistry>,
    monitor: ProcessMonitor,
}

impl Supervisor {
    async fn run(self) {
        match self.launch().await {
            Ok(child) => self.supervise(child).await,
            Err(e) => {
                error!(run_id = %self.run_id, error = %e, "Run launch failed");
                let reason = e.to_string();
                self.monitor.launch_failed(reason.clone());
                self.finish(RunUpdate::failed(reason, None)).await;
            }
        }
    }

    async fn launch(&self) -> Result<Child, LaunchError> {
        let dir = self
            .config
            .run_directory(&self.params.experiment_name, self.run_id);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| LaunchError::Io {
                path: dir.clone(),
                source,
            })?;

        // Must be persisted before the process exists.
        self.writer
            .apply(
                self.run_id,
                RunUpdate::output_directory(dir.to_string_lossy()),
            )
            .await?;

        let stdout = open_log(&dir.join(STDOUT_LOG)).await?;
        let stderr = open_log(&dir.join(STDERR_LOG)).await?;

        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.config.command_args(&self.params))
            .env(RUN_ID_ENV, self.run_id.to_string())
            .env(OUTPUT_DIR_ENV, &dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        if let Some(working_dir) = &self.config.working_dir {
            cmd.current_dir(working_dir);
        }

        debug!(run_id = %self.run_id, "Full command: {:?}", cmd);

        cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: self.config.program.clone(),
            source,
        })
    }

    async fn supervise(self, mut child: Child) {
        let pid = child.id();
        self.monitor.running(pid);
        info!(run_id = %self.run_id, pid = ?pid, "Run process spawned");
        self.record(RunUpdate::running(pid)).await;

        let update = match child.wait().await {
            Ok(status) => {
                let code = status.code();
                self.monitor.exited(code);
                info!(
                    run_id = %self.run_id,
                    exit_code = ?code,
                    success = status.success(),
                    "Run process exited"
                );
                if status.success() {
                    RunUpdate::succeeded(0)
                } else {
                    RunUpdate::failed(describe_exit(code), code)
                }
            }
            Err(e) => {
                error!(run_id = %self.run_id, error = %e, "Failed to wait for run process");
                self.monitor.exited(None);
                RunUpdate::failed(format!("lost track of process: {}", e), None)
            }
        };

        self.finish(update).await;
    }

    /// Record the terminal update and drop the registry entry once the
    /// outcome is persisted. On a store failure the entry is kept so a status
    /// query can still finalize the run.
    async fn finish(&self, update: RunUpdate) {
        if self.record(update).await {
            self.registry.forget(self.run_id).await;
        }
    }

    /// Persist an update through the writer. Returns true if the row now
    /// reflects it or was already advanced by the reconciler.
    async fn record(&self, update: RunUpdate) -> bool {
        match self.writer.apply(self.run_id, update).await {
            Ok(_) => true,
            Err(e) if e.is_lifecycle_conflict() => {
                debug!(run_id = %self.run_id, error = %e, "Run already advanced by reconciler");
                true
            }
            Err(e) => {
                warn!(run_id = %self.run_id, error = %e, "Failed to record run update");
                false
            }
        }
    }
}

async fn open_log(path: &Path) -> Result<File, LaunchError> {
    let to_launch_error = |source: io::Error| LaunchError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(to_launch_error)?;
    Ok(file.into_std().await)
}

#[cfg(test)]
mod tests {
    use labrun_core::RunStatus;

    use super::*;
    use crate::reconciler::StatusReconciler;
    use crate::store::MemoryRunStore;
    use crate::writer::spawn_store_writer;

    struct Harness {
        store: Arc<MemoryRunStore>,
        registry: Arc<ProcessRegistry>,
        launcher: RunLauncher,
        root: tempfile::TempDir,
    }

    fn harness(program: &str, script_args: &[&str]) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryRunStore::new());
        let registry = Arc::new(ProcessRegistry::new());
        let (writer, _task) = spawn_store_writer(store.clone());
        let config = LaunchConfig {
            results_root: root.path().to_path_buf(),
            program: program.to_string(),
            script_args: script_args.iter().map(|s| s.to_string()).collect(),
            working_dir: None,
        };
        let launcher = RunLauncher::new(store.clone(), registry.clone(), writer, config);
        Harness {
            store,
            registry,
            launcher,
            root,
        }
    }

    /// Wait for the supervisor to record a terminal status.
    async fn wait_terminal(store: &MemoryRunStore, id: RunId) -> labrun_core::Run {
        for _ in 0..200 {
            let run = store.get(id).await.unwrap().unwrap();
            if run.is_terminal() {
                return run;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("run {} never reached a terminal status", id);
    }

    /// Wait for the supervisors to drop their registry entries.
    async fn wait_registry_empty(registry: &ProcessRegistry) {
        for _ in 0..200 {
            if registry.is_empty().await {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("registry still tracks {} handles", registry.len().await);
    }

    #[test]
    fn test_command_args_contract() {
        let config = LaunchConfig::default();
        let params = StartRun::new("gpt-4o", "nanoGPT", 3).validate().unwrap();

        assert_eq!(config.program, "python");
        assert_eq!(
            config.command_args(&params),
            vec![
                "launch_scientist.py",
                "--model",
                "gpt-4o",
                "--experiment",
                "nanoGPT",
                "--num-ideas",
                "3"
            ]
        );
        assert_eq!(
            config.run_directory("nanoGPT", RunId::new(7)),
            PathBuf::from("results/nanoGPT/run_7")
        );
    }

    #[tokio::test]
    async fn test_validation_error_creates_no_row() {
        let h = harness("sh", &["-c", "exit 0"]);

        let err = h
            .launcher
            .start_run(StartRun::new("gpt-4", "../escape", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));

        let err = h
            .launcher
            .start_run(StartRun::new("gpt-4", "exp", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));

        assert!(h.store.is_empty().await);
        assert!(h.registry.is_empty().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_writes_log_and_succeeds() {
        let h = harness("sh", &["-c", "echo ok; printf '%s ' \"$0\" \"$@\" >&2"]);

        let id = h
            .launcher
            .start_run(StartRun::new("gpt-4", "exp_a", 3))
            .await
            .unwrap();
        assert_eq!(id, RunId::new(1));

        let run = wait_terminal(&h.store, id).await;
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.exit_code, Some(0));
        assert!(run.pid.is_some());
        assert!(run.started_at.is_some());

        let dir = PathBuf::from(run.output_directory.unwrap());
        assert!(dir.ends_with("exp_a/run_1"));
        let stdout = std::fs::read_to_string(dir.join(STDOUT_LOG)).unwrap();
        assert_eq!(stdout, "ok\n");
        let stderr = std::fs::read_to_string(dir.join(STDERR_LOG)).unwrap();
        assert_eq!(stderr, "--model gpt-4 --experiment exp_a --num-ideas 3 ");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_marks_failed() {
        let h = harness("sh", &["-c", "exit 5"]);

        let id = h
            .launcher
            .start_run(StartRun::new("gpt-4", "exp_b", 1))
            .await
            .unwrap();

        let run = wait_terminal(&h.store, id).await;
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.exit_code, Some(5));
        assert_eq!(
            run.error_message.as_deref(),
            Some("process exited with code 5")
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_marks_failed_without_process() {
        let h = harness("/nonexistent/labrun-missing-binary", &[]);

        let id = h
            .launcher
            .start_run(StartRun::new("gpt-4", "exp_c", 1))
            .await
            .unwrap();

        let run = wait_terminal(&h.store, id).await;
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.started_at.is_none());
        assert!(run
            .error_message
            .unwrap()
            .contains("/nonexistent/labrun-missing-binary"));

        // The directory was provisioned before the spawn attempt.
        assert!(PathBuf::from(run.output_directory.unwrap()).is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_directory_failure_marks_failed() {
        let h = harness("sh", &["-c", "exit 0"]);
        // A file where the experiment directory should go.
        std::fs::write(h.root.path().join("exp_d"), b"").unwrap();

        let id = h
            .launcher
            .start_run(StartRun::new("gpt-4", "exp_d", 1))
            .await
            .unwrap();

        let run = wait_terminal(&h.store, id).await;
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.output_directory.is_none());
        assert!(run.error_message.unwrap().starts_with("failed to prepare"));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_launches_get_distinct_increasing_ids() {
        let h = Arc::new(harness("sh", &["-c", "exit 0"]));

        let mut handles = Vec::new();
        for i in 0..16 {
            let h = h.clone();
            handles.push(tokio::spawn(async move {
                h.launcher
                    .start_run(StartRun::new("gpt-4", format!("exp_{}", i), 1))
                    .await
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 16);
        assert_eq!(ids.first(), Some(&RunId::new(1)));
        assert_eq!(ids.last(), Some(&RunId::new(16)));

        for id in ids {
            wait_terminal(&h.store, id).await;
        }
        assert_eq!(h.store.len().await, 16);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_finished_runs_leave_the_registry() {
        let h = harness("sh", &["-c", "exit 0"]);

        let mut ids = Vec::new();
        for i in 0..20 {
            let id = h
                .launcher
                .start_run(StartRun::new("gpt-4", format!("exp_{}", i), 1))
                .await
                .unwrap();
            ids.push(id);
        }
        for id in ids {
            assert_eq!(wait_terminal(&h.store, id).await.status, RunStatus::Success);
        }

        // No status query was made for any of them.
        wait_registry_empty(&h.registry).await;
        assert_eq!(h.registry.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_launch_leaves_the_registry() {
        let h = harness("/nonexistent/labrun-missing-binary", &[]);

        let id = h
            .launcher
            .start_run(StartRun::new("gpt-4", "exp_e", 1))
            .await
            .unwrap();

        assert_eq!(wait_terminal(&h.store, id).await.status, RunStatus::Failed);
        wait_registry_empty(&h.registry).await;
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fresh_runs_are_never_reported_stale() {
        let h = harness("sh", &["-c", "exit 0"]);
        let reconciler = Arc::new(StatusReconciler::new(
            h.store.clone(),
            h.registry.clone(),
        ));

        for i in 1..=100 {
            let id = RunId::new(i);
            let poller = {
                let reconciler = reconciler.clone();
                tokio::spawn(async move {
                    loop {
                        match reconciler.status(id).await {
                            Err(TrackerError::NotFound(_)) => tokio::task::yield_now().await,
                            Err(TrackerError::StaleStatus { .. }) => return false,
                            _ => return true,
                        }
                    }
                })
            };

            let started = h
                .launcher
                .start_run(StartRun::new("gpt-4", "exp_a", 1))
                .await
                .unwrap();
            assert_eq!(started, id);
            assert!(poller.await.unwrap(), "run {} was reported stale", id);
        }
    }
}
