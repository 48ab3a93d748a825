//! HTTP request handlers.

mod files;
mod health;
mod runs;

pub use files::{get_run_log, get_run_result};
pub use health::{health_check, metrics_handler};
pub use runs::{create_run, create_run_form, get_run, get_run_status, list_runs, wait_run};
