use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use ts2sh::sources::collect_sources;
use ts2sh::{load_config_or_default, Job, JobStatus, Orchestrator};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "ts2sh")]
#[command(about = "Compile TypeScript projects into self-extracting shell executables")]
#[command(version)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(long, global = true, env = "TS2SH_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a project and wait for the result
    Convert {
        /// Display name of the project
        project_name: String,

        /// Source files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Copy the finished artifact to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show one job
    Status { job_id: String },
    /// List the 100 most recent jobs, newest first
    List,
    /// Write a completed job's artifact to disk
    Download {
        job_id: String,

        /// Destination file (defaults to the artifact's name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a job and its artifact
    Delete { job_id: String },
    /// Fail jobs interrupted by a previous run, clear stale staging and resume pending ones
    Recover,
}

fn init_tracing(json: bool) -> Result<()> {
    tracing_log::LogTracer::init().context("Failed to install log bridge")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        let subscriber = registry.with(fmt::layer().json().with_writer(std::io::stderr));
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = registry.with(fmt::layer().with_writer(std::io::stderr));
        tracing::subscriber::set_global_default(subscriber)
    };
    installed.context("Failed to install tracing subscriber")
}

fn print_job(job: &Job) {
    println!("Job:      {}", job.id);
    println!("Project:  {}", job.project_name);
    println!("Status:   {}", job.status);
    println!("Progress: {}%", job.progress);
    if let Some(message) = &job.message {
        println!("Message:  {}", message);
    }
    println!("Created:  {}", job.created_at.to_rfc3339());
    if let Some(artifact) = &job.artifact_location {
        println!("Artifact: {}", artifact.display());
    }
    if let Some(error) = &job.error_message {
        println!("Error:\n{}", error);
    }
}

fn write_executable(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to make {} executable", path.display()))?;
    }
    Ok(())
}

fn save_artifact(orchestrator: &Orchestrator, job_id: &str, output: Option<PathBuf>) -> Result<()> {
    let artifact = orchestrator.download(job_id)?;
    let path = output.unwrap_or_else(|| PathBuf::from(&artifact.file_name));
    write_executable(&path, &artifact.bytes)?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Waits for SIGINT or SIGTERM and returns the matching 128+N exit status.
#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<u8> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| 130),
        _ = terminate.recv() => Ok(143),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<u8> {
    tokio::signal::ctrl_c().await.map(|()| 130)
}

async fn interrupted() -> u8 {
    match wait_for_signal().await {
        Ok(code) => code,
        Err(e) => {
            warn!("Cannot listen for termination signals: {}", e);
            std::future::pending().await
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config =
        load_config_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    let orchestrator = Orchestrator::open(&config).with_context(|| {
        format!("Failed to open job database {}", config.database_path.display())
    })?;

    tokio::select! {
        outcome = execute(cli.command, &orchestrator) => outcome,
        code = interrupted() => {
            warn!("Interrupted, stopping running conversions");
            orchestrator.shutdown().await;
            Ok(ExitCode::from(code))
        }
    }
}

async fn execute(command: Command, orchestrator: &Orchestrator) -> Result<ExitCode> {
    match command {
        Command::Convert {
            project_name,
            paths,
            output,
        } => {
            let files = collect_sources(&paths)?;
            let job = orchestrator.submit(&project_name, files)?;
            println!("Submitted job {}", job.id);

            let job = orchestrator.wait_for_terminal(&job.id, POLL_INTERVAL).await?;
            print_job(&job);
            if job.status != JobStatus::Completed {
                return Ok(ExitCode::FAILURE);
            }
            if let Some(output) = output {
                save_artifact(orchestrator, &job.id, Some(output))?;
            }
        }
        Command::Status { job_id } => {
            print_job(&orchestrator.get(&job_id)?);
        }
        Command::List => {
            let jobs = orchestrator.list()?;
            if jobs.is_empty() {
                println!("No jobs");
            }
            for job in jobs {
                println!(
                    "{}  {:<10}  {:>3}%  {}  {}",
                    job.id,
                    job.status.as_str(),
                    job.progress,
                    job.created_at.format("%Y-%m-%d %H:%M:%S"),
                    job.project_name
                );
            }
        }
        Command::Download { job_id, output } => {
            save_artifact(orchestrator, &job_id, output)?;
        }
        Command::Delete { job_id } => {
            orchestrator.delete(&job_id)?;
            println!("Deleted job {}", job_id);
        }
        Command::Recover => {
            let report = orchestrator.recover()?;
            if report.swept_staging > 0 {
                println!("Removed {} stale staging entries", report.swept_staging);
            }
            for id in &report.failed {
                println!("Failed interrupted job {}", id);
            }
            for id in &report.requeued {
                println!("Resumed pending job {}", id);
            }
            orchestrator.wait_idle().await;
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json)?;
    run(cli).await
}
