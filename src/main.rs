//! caret-batch: run batches of shell command lists with bounded concurrency
//!
//! Each manifest is one batch. Manifests run one after another; the exit
//! code is the number of failed work items.

use anyhow::Result;
use clap::Parser;
use std::io;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use caret_batch::app::{exit_code, App};
use caret_batch::config::{OutputMode, RunnerConfig, Schedule};
use caret_batch::services::cancellation;

/// Run batches of shell commands concurrently and report failures
#[derive(Parser, Debug)]
#[command(name = "caret-batch", version, about)]
struct Args {
    /// Manifest files (JSON or plain text), run in the given order
    #[arg(required = true)]
    manifests: Vec<PathBuf>,

    /// Maximum number of work items running at once
    #[arg(short = 'j', long)]
    jobs: Option<NonZeroUsize>,

    /// Scheduling strategy (wavefront, sliding)
    #[arg(long)]
    schedule: Option<Schedule>,

    /// Kill any command running longer than this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Write each work item's output to a log file in this directory
    #[arg(long, conflicts_with = "quiet")]
    log_dir: Option<PathBuf>,

    /// Discard command output
    #[arg(short, long)]
    quiet: bool,

    /// Configuration file (replaces project and user config lookup)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the execution plan without running anything
    #[arg(long)]
    dry_run: bool,

    /// Log level used when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Initialize logging with RUST_LOG environment variable support
fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Fold command line flags into the loaded configuration
fn apply_overrides(config: &mut RunnerConfig, args: &Args) {
    if let Some(schedule) = args.schedule {
        config.executor.schedule = schedule;
    }
    if let Some(timeout) = args.timeout {
        config.executor.command_timeout_seconds = Some(timeout);
    }
    if let Some(directory) = &args.log_dir {
        config.output = OutputMode::Log {
            directory: directory.clone(),
        };
    } else if args.quiet {
        config.output = OutputMode::Discard;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let project_root = std::env::current_dir()?;
    let mut config = match &args.config {
        Some(path) => RunnerConfig::load_file(path)?,
        None => RunnerConfig::load(Some(&project_root))?,
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    let manifests = App::load_manifests(&args.manifests)?;

    let (cancel_handle, cancel_token) = cancellation();
    let app = App::new(config).with_cancellation(cancel_token);

    if args.dry_run {
        print!("{}", app.plan(&manifests, args.jobs));
        return Ok(());
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, cancelling running commands");
            cancel_handle.cancel();
        }
    });

    let runs = app.run(manifests, args.jobs).await?;

    for run in &runs {
        println!();
        println!(
            "{} ({} work items, max concurrency {}):",
            run.path.display(),
            run.report.len(),
            run.max_concurrency
        );
        println!("{}", run.report.summary());
        println!(
            "Total time (in seconds): {:.3}",
            run.report.elapsed().as_secs_f64()
        );
    }

    std::process::exit(exit_code(&runs));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_jobs_rejected() {
        let err = Args::try_parse_from(["caret-batch", "-j", "0", "batch.json"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_jobs_parsed() {
        let args = Args::try_parse_from(["caret-batch", "--jobs", "2", "batch.json"]).unwrap();
        assert_eq!(args.jobs, NonZeroUsize::new(2));
        assert_eq!(args.manifests, vec![PathBuf::from("batch.json")]);
    }

    #[test]
    fn test_quiet_conflicts_with_log_dir() {
        assert!(Args::try_parse_from(["caret-batch", "-q", "--log-dir", "logs", "b.json"]).is_err());
    }
}
