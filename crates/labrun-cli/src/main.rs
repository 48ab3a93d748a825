//! labrun CLI - Command line interface for the labrun control plane.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use labrun_client::types::StartRunBody;
use labrun_client::{ClientError, LabrunClient, RunStatusView};
use labrun_core::{RunId, RunStatus};

/// labrun CLI - launch and track research runs
#[derive(Parser)]
#[command(name = "labrun")]
#[command(about = "CLI for the labrun control plane", long_about = None)]
struct Cli {
    /// Control plane address
    #[arg(short, long, env = "LABRUN_URL", default_value = "http://127.0.0.1:8000")]
    addr: String,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new run
    Start {
        /// Model name passed to the launch script
        #[arg(short, long)]
        model: String,

        /// Experiment (template directory) name
        #[arg(short, long)]
        experiment: String,

        /// Number of ideas to generate
        #[arg(short, long, default_value = "1")]
        num_ideas: i64,

        /// Template slug, if different from the experiment
        #[arg(short, long)]
        template: Option<String>,

        /// Wait for the run to finish
        #[arg(short, long)]
        wait: bool,
    },

    /// Get the reconciled status of a run
    Status {
        /// Run ID
        id: RunId,
    },

    /// List all runs
    List,

    /// Print a run's log
    Log {
        /// Run ID
        id: RunId,

        /// Which stream to print
        #[arg(short, long, value_enum, default_value = "stdout")]
        stream: Stream,
    },

    /// Download a result file
    Fetch {
        /// Run ID
        id: RunId,

        /// File name inside the run's output directory
        file: String,

        /// Destination path (defaults to the file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Wait until a run finishes
    Wait {
        /// Run ID
        id: RunId,

        /// Seconds the server holds each wait request open
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = LabrunClient::new(&cli.addr);

    match cli.command {
        Commands::Start {
            model,
            experiment,
            num_ideas,
            template,
            wait,
        } => {
            let body = StartRunBody {
                model,
                experiment,
                num_ideas,
                template,
            };
            let run_id = client.start_run(&body).await?;
            println!("Run started: {}", run_id);
            if wait {
                wait_for(&client, run_id, Duration::from_secs(30), cli.json).await?;
            }
        }
        Commands::Status { id } => {
            let status = client.status(id).await.map_err(|e| stale_hint(id, e))?;
            if cli.json {
                print_json(&status_json(&client, id).await?)?;
            } else {
                print_status(&status);
            }
        }
        Commands::List => {
            if cli.json {
                print_json(&client.get_json::<serde_json::Value>("/runs").await?)?;
            } else {
                list_runs(&client).await?;
            }
        }
        Commands::Log { id, stream } => {
            print!("{}", client.log(id, stream.as_str()).await?);
        }
        Commands::Fetch { id, file, output } => {
            let bytes = client.fetch(id, &file).await?;
            let dest = output.unwrap_or_else(|| PathBuf::from(&file));
            tokio::fs::write(&dest, &bytes).await?;
            println!("Wrote {} bytes to {}", bytes.len(), dest.display());
        }
        Commands::Wait { id, timeout } => {
            wait_for(&client, id, Duration::from_secs(timeout.max(1)), cli.json).await?;
        }
    }

    Ok(())
}

async fn wait_for(
    client: &LabrunClient,
    id: RunId,
    poll_timeout: Duration,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = client
        .wait(id, poll_timeout)
        .await
        .map_err(|e| stale_hint(id, e))?;
    if json {
        print_json(&status_json(client, id).await?)?;
    } else {
        print_status(&status);
    }

    if status.status == RunStatus::Failed {
        return Err(format!("run {} failed", id).into());
    }
    Ok(())
}

/// Explain a 409 reply before passing the error on.
fn stale_hint(id: RunId, err: ClientError) -> ClientError {
    if err.is_conflict() {
        eprintln!(
            "run {} has no tracked process (the server was restarted); its status cannot be reconciled",
            id
        );
    }
    err
}

async fn list_runs(client: &LabrunClient) -> Result<(), Box<dyn std::error::Error>> {
    let runs = client.list_runs().await?;

    println!("Runs ({}):", runs.len());
    println!(
        "{:<6}  {:<8}  {:<20}  {:<20}  {}",
        "ID", "STATUS", "MODEL", "EXPERIMENT", "CREATED"
    );
    println!("{}", "-".repeat(80));

    for run in runs {
        println!(
            "{:<6}  {:<8}  {:<20}  {:<20}  {}",
            run.run_id,
            run.status,
            run.model_name,
            run.experiment_name,
            format_timestamp(&run.created_at)
        );
    }

    Ok(())
}

async fn status_json(
    client: &LabrunClient,
    id: RunId,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    Ok(client.get_json(&format!("/runs/{}/status", id)).await?)
}

fn print_status(status: &RunStatusView) {
    println!("  ID:         {}", status.run_id);
    println!("  Status:     {}", status.status);
    println!("  Created:    {}", format_timestamp(&status.created_at));
    if let Some(started) = &status.started_at {
        println!("  Started:    {}", format_timestamp(started));
    }
    if let Some(finished) = &status.finished_at {
        println!("  Finished:   {}", format_timestamp(finished));
    }
    if let Some(dir) = &status.output_directory {
        println!("  Output:     {}", dir);
    }
    if let Some(code) = status.exit_code {
        println!("  Exit code:  {}", code);
    }
    if let Some(message) = &status.error_message {
        println!("  Error:      {}", message);
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_timestamp(rfc3339: &str) -> String {
    match DateTime::parse_from_rfc3339(rfc3339) {
        Ok(dt) => dt
            .with_timezone(&Utc)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        Err(_) => rfc3339.to_string(),
    }
}
