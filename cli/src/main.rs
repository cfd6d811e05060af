//! CLI for issue-sync.
//!
//! Mirrors upstream GitHub issues and pull requests into Jira, either as a
//! one-off batch over every mapped repository or as a listener fed one bus
//! event per line on stdin.

use clap::{Parser, ValueEnum};
use issue_sync::{RunSummary, Runner, RunnerConfig, RunnerError, SyncConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// What the process does after loading its configuration.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Sync every issue, then every pull request, of the mapped repositories.
    Initialize,
    /// Handle bus events read from stdin, one JSON object per line.
    Listen,
    /// Close duplicate tickets for every upstream issue.
    CloseDuplicates,
    /// Print the URL of every upstream issue under the map.
    ListManaged,
}

/// issue-sync - Keep Jira reconciled with upstream issues and pull requests.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(long, env = "ISSUE_SYNC_CONFIG", default_value = "issue-sync.toml")]
    config: PathBuf,

    /// Operation to run.
    #[arg(long, value_enum, default_value_t = Mode::Initialize)]
    mode: Mode,

    /// Only touch this upstream repository (`owner/name`).
    #[arg(long)]
    repo: Option<String>,

    /// Match and log, but never write to Jira.
    #[arg(long)]
    dry_run: bool,

    /// Run initialization before listening.
    #[arg(long)]
    initialize: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    // octocrab and reqwest both pull in rustls; pick one process-wide provider.
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    let args = Args::parse();

    match run(args).await {
        Ok(summary) => {
            print_summary(&summary);
            if summary.has_failures() {
                ExitCode::from(1)
            } else {
                ExitCode::from(0)
            }
        }
        Err(e) => {
            error!(error = %e, "Critical failure");
            ExitCode::from(2)
        }
    }
}

/// Initializes tracing with environment filter support.
///
/// Uses compact single-line output and reads the level from `RUST_LOG`,
/// falling back to "info".
fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Main execution logic.
async fn run(args: Args) -> Result<RunSummary, RunnerError> {
    let mut sync = SyncConfig::load(&args.config)?;
    if args.dry_run {
        sync.testing = true;
    }

    let runner = Runner::new(RunnerConfig::new(args.repo), Arc::new(sync))?;

    match args.mode {
        Mode::Initialize => runner.initialize().await,
        Mode::Listen => {
            let mut summary = RunSummary::new(args.dry_run);
            if args.initialize {
                summary.absorb(&runner.initialize().await?);
            }
            let stdin = BufReader::new(tokio::io::stdin());
            summary.absorb(&runner.listen(stdin).await?);
            Ok(summary)
        }
        Mode::CloseDuplicates => runner.close_duplicates().await,
        Mode::ListManaged => {
            for url in runner.list_managed().await? {
                println!("{url}");
            }
            Ok(RunSummary::new(args.dry_run))
        }
    }
}

/// Prints the final run summary.
fn print_summary(summary: &RunSummary) {
    println!("\nSummary:");
    println!(
        "  Mode: {}",
        if summary.dry_run { "Dry Run" } else { "Live" }
    );
    println!(
        "  Repositories processed: {}",
        summary.repositories_processed
    );
    println!("  Tickets created: {}", summary.created);
    println!("  Tickets updated: {}", summary.updated);
    println!("  Tickets upgraded: {}", summary.upgraded);
    println!("  Pull requests linked: {}", summary.linked);
    println!("  Skipped: {}", summary.skipped);
    if summary.duplicates_closed > 0 {
        println!("  Duplicates closed: {}", summary.duplicates_closed);
    }
    if summary.rate_limit_restarts > 0 {
        println!("  Rate limit restarts: {}", summary.rate_limit_restarts);
    }
    println!("  Failed: {}", summary.failed);
}
