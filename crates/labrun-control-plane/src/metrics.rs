//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::collections::HashMap;
use std::fmt::Write;

use labrun_core::RunStatus;

use crate::state::AppState;
use crate::store::StoreError;

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &AppState) -> Result<String, StoreError> {
    let mut output = String::new();

    collect_run_metrics(state, &mut output).await?;
    collect_process_metrics(state, &mut output).await;

    Ok(output)
}

/// Collect run metrics by status.
async fn collect_run_metrics(state: &AppState, output: &mut String) -> Result<(), StoreError> {
    let runs = state.store.list().await?;

    let mut counts: HashMap<RunStatus, u64> =
        RunStatus::all().iter().map(|status| (*status, 0)).collect();
    for run in &runs {
        *counts.entry(run.status).or_default() += 1;
    }

    writeln!(output, "# HELP labrun_runs_total Number of runs by status").ok();
    writeln!(output, "# TYPE labrun_runs_total gauge").ok();
    for status in RunStatus::all() {
        let count = counts.get(status).copied().unwrap_or(0);
        writeln!(
            output,
            "labrun_runs_total{{status=\"{}\"}} {count}",
            status.as_str().to_lowercase()
        )
        .ok();
    }

    Ok(())
}

/// Collect process registry metrics.
async fn collect_process_metrics(state: &AppState, output: &mut String) {
    let tracked = state.registry.len().await;
    let live = state.registry.live_count().await;

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP labrun_processes_tracked Process handles held by the registry"
    )
    .ok();
    writeln!(output, "# TYPE labrun_processes_tracked gauge").ok();
    writeln!(output, "labrun_processes_tracked {tracked}").ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP labrun_processes_live Tracked processes that have not exited"
    )
    .ok();
    writeln!(output, "# TYPE labrun_processes_live gauge").ok();
    writeln!(output, "labrun_processes_live {live}").ok();
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use labrun_core::{RunUpdate, StartRun};

    use super::*;
    use crate::launcher::LaunchConfig;
    use crate::store::{MemoryRunStore, RunStore};

    #[tokio::test]
    async fn test_collect_metrics_empty_state() {
        let state = AppState::new(Arc::new(MemoryRunStore::new()), LaunchConfig::default());
        let output = collect_metrics(&state).await.unwrap();

        assert!(output.contains("labrun_runs_total{status=\"pending\"} 0"));
        assert!(output.contains("labrun_runs_total{status=\"success\"} 0"));
        assert!(output.contains("labrun_processes_tracked 0"));
        assert!(output.contains("labrun_processes_live 0"));
    }

    #[tokio::test]
    async fn test_collect_metrics_counts_runs() {
        let store = Arc::new(MemoryRunStore::new());
        for experiment in ["a", "b", "c"] {
            store
                .create(StartRun::new("gpt-4", experiment, 1).validate().unwrap())
                .await
                .unwrap();
        }
        let run = store.list().await.unwrap()[0].clone();
        store
            .update(run.id, RunUpdate::failed("boom", Some(1)))
            .await
            .unwrap();

        let state = AppState::new(store, LaunchConfig::default());
        let output = collect_metrics(&state).await.unwrap();

        assert!(output.contains("labrun_runs_total{status=\"pending\"} 2"));
        assert!(output.contains("labrun_runs_total{status=\"failed\"} 1"));
        assert!(output.contains("labrun_runs_total{status=\"running\"} 0"));
    }
}
