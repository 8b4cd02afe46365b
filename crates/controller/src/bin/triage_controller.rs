//! Triage controller binary.
//!
//! Scheduled-sweep entry point for the triage engine: run a single
//! staleness sweep, sweep on a fixed interval, or validate the
//! configuration and exit. Event intake transport is intentionally not
//! wired here; discrete events enter through the library's channel API.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::TriageConfig;
use controller::{Orchestrator, OrchestratorOptions, RetryPolicy, SweepReport};
use forge::GitHubForge;

#[derive(Parser)]
#[command(
    name = "triage-controller",
    about = "Path-based labeling and staleness management for forge repositories",
    version
)]
struct Cli {
    /// Path to the triage configuration file.
    #[arg(long, env = "TRIAGE_CONFIG", default_value = "triage.yml")]
    config: PathBuf,

    /// Forge API token.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Repository owner.
    #[arg(long, env = "GITHUB_OWNER")]
    owner: Option<String>,

    /// Repository name.
    #[arg(long, env = "GITHUB_REPO")]
    repo: Option<String>,

    /// Maximum items processed concurrently during a sweep.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Log decisions without mutating the forge.
    #[arg(long)]
    dry_run: bool,

    /// Cap on mutating forge calls per sweep (0 disables the cap).
    #[arg(long, default_value_t = 30)]
    max_operations: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single staleness sweep.
    Sweep,
    /// Run sweeps on a fixed interval.
    Run {
        /// Seconds between sweeps.
        #[arg(long, default_value_t = 3600)]
        interval: u64,
    },
    /// Validate the configuration and exit.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("controller=info".parse()?))
        .init();

    let cli = Cli::parse();

    let triage_config = TriageConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    if matches!(cli.command, Command::Check) {
        info!(
            rules = triage_config.rules.len(),
            "Configuration is valid"
        );
        return Ok(());
    }

    let token = cli
        .token
        .context("A forge token is required (set GITHUB_TOKEN or pass --token)")?;
    let owner = cli
        .owner
        .context("A repository owner is required (set GITHUB_OWNER or pass --owner)")?;
    let repo = cli
        .repo
        .context("A repository name is required (set GITHUB_REPO or pass --repo)")?;

    let forge = GitHubForge::new(token, owner, repo).context("Failed to build forge client")?;

    let options = OrchestratorOptions {
        concurrency: cli.concurrency,
        dry_run: cli.dry_run,
        max_operations: (cli.max_operations > 0).then_some(cli.max_operations),
        retry: RetryPolicy::default(),
    };
    let orchestrator =
        Orchestrator::new(Arc::new(forge), Arc::new(triage_config)).with_options(options);

    match cli.command {
        Command::Sweep => {
            let report = orchestrator.run_sweep().await?;
            log_report(&report);
        }
        Command::Run { interval } => {
            info!(interval_secs = interval, "Starting periodic sweep loop");
            run_loop(&orchestrator, interval).await;
        }
        Command::Check => {}
    }

    Ok(())
}

async fn run_loop(orchestrator: &Orchestrator, interval_secs: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        ticker.tick().await;
        match orchestrator.run_sweep().await {
            Ok(report) => log_report(&report),
            Err(err) => error!(error = %err, "Sweep failed"),
        }
    }
}

fn log_report(report: &SweepReport) {
    info!(
        items_scanned = report.items_scanned,
        marked_stale = report.marked_stale,
        closed = report.closed,
        unstaled = report.unstaled,
        skipped_budget = report.skipped_budget,
        failures = report.failures.len(),
        "Sweep report"
    );
    for failure in &report.failures {
        warn!(
            kind = ?failure.kind,
            number = failure.number,
            error = %failure.error,
            "Item was skipped and will be retried on the next sweep"
        );
    }
}
