//! labrun Control Plane Server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use labrun_control_plane::{
    http, AppState, Config, LaunchConfig, MemoryRunStore, RunStore, SqliteRunStore,
};

/// labrun control plane: launches and tracks research runs.
#[derive(Parser, Debug)]
#[command(name = "labrun-control-plane", about = "labrun run lifecycle tracker")]
struct Args {
    /// HTTP server address
    #[arg(long, env = "LABRUN_HTTP_ADDR", default_value = "127.0.0.1:8000")]
    http_addr: String,

    /// SQLite database path, or "memory" for a throwaway store
    #[arg(long, env = "LABRUN_DB", default_value = "labrun.db")]
    database: String,

    /// Directory holding one subdirectory per experiment
    #[arg(long, env = "LABRUN_RESULTS_DIR", default_value = "results")]
    results_dir: PathBuf,

    /// Program used to launch runs
    #[arg(long, default_value = "python")]
    program: String,

    /// Script passed to the program before the run parameters
    #[arg(long, default_value = "launch_scientist.py")]
    script: String,

    /// Working directory for launched processes
    #[arg(long)]
    working_dir: Option<PathBuf>,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            http_addr: args.http_addr,
            database: args.database,
            launch: LaunchConfig {
                results_root: args.results_dir,
                program: args.program,
                script_args: vec![args.script],
                working_dir: args.working_dir,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("labrun=info".parse()?))
        .with_target(true)
        .init();

    let config = Config::from(args);
    let http_addr: SocketAddr = config.http_addr.parse()?;

    // Open the run store
    let store: Arc<dyn RunStore> = if config.is_in_memory() {
        warn!("Using in-memory run store - runs are lost on restart");
        Arc::new(MemoryRunStore::new())
    } else {
        let path = config.database_path();
        info!(database = %path.display(), "Opening run store");
        Arc::new(SqliteRunStore::open(&path)?)
    };

    tokio::fs::create_dir_all(&config.launch.results_root)
        .await
        .map_err(|e| {
            format!(
                "Failed to create results directory '{}': {}",
                config.launch.results_root.display(),
                e
            )
        })?;

    info!(
        http_addr = %http_addr,
        results_dir = %config.launch.results_root.display(),
        program = %config.launch.program,
        "Starting labrun control plane"
    );

    // Create shared state and HTTP router
    let state = AppState::new(store, config.launch);
    let router = http::create_router(state);

    let listener = TcpListener::bind(http_addr).await?;
    info!("HTTP server listening on {}", http_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("labrun control plane stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
