//! affcast-send - Deliver due posts from the queue
//!
//! Runs one dispatch cycle and exits, which is what cron wants. With
//! `--loop` it keeps polling until SIGINT/SIGTERM.

use clap::Parser;
use libaffcast::dispatch::CycleReport;
use libaffcast::logging::{LogFormat, LoggingConfig};
use libaffcast::platforms::Publishers;
use libaffcast::{AffcastError, Config, Database, Dispatcher, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

/// Exit code for a cycle that completed but had failed entries
const EXIT_CYCLE_FAILURES: i32 = 4;

#[derive(Parser, Debug)]
#[command(name = "affcast-send")]
#[command(version)]
#[command(about = "Deliver due affiliate posts from the queue")]
#[command(long_about = "\
affcast-send - Deliver due affiliate posts from the queue

DESCRIPTION:
    affcast-send selects every pending queue entry whose scheduled time has
    passed, publishes it to X and/or Instagram, and records the outcome
    (posted or failed) on the entry before moving to the next one.

    Failed entries are not retried automatically; use `affcast-queue now`
    to re-send them. Facebook entries are only sent through `affcast-queue now`.

USAGE:
    # One cycle, as run from cron every minute
    affcast-send

    # Show what would be sent without calling any platform
    affcast-send --dry-run

    # Keep running, polling every 30 seconds
    affcast-send --loop --poll-interval 30

SIGNALS:
    SIGTERM, SIGINT - Stop after the current cycle (loop mode)

CONFIGURATION:
    Configuration file: ~/.config/affcast/config.toml (or $AFFCAST_CONFIG)
    Database location: ~/.local/share/affcast/affcast.db

    Credentials may come from the environment instead:
    X_ACCESS_TOKEN, X_BEARER_TOKEN, IG_USER_ID, IG_ACCESS_TOKEN,
    FB_PAGE_ID, FB_PAGE_ACCESS_TOKEN

EXIT CODES:
    0 - Cycle completed, no entry failed
    1 - Runtime or configuration error
    3 - Invalid input
    4 - Cycle completed, at least one entry failed
")]
struct Cli {
    /// Resolve due posts and log the intended actions without publishing
    #[arg(long)]
    dry_run: bool,

    /// Keep polling instead of running a single cycle
    #[arg(long = "loop")]
    run_loop: bool,

    /// Seconds between cycles in loop mode (overrides config)
    #[arg(long, value_name = "SECONDS", requires = "run_loop")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log output format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.log_format, cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let publishers = Publishers::from_config(&config)?;
    let dispatcher = Dispatcher::new(db.clone(), publishers).with_dry_run(cli.dry_run);

    let code = if cli.run_loop {
        let poll_interval = cli.poll_interval.unwrap_or(config.dispatch.poll_interval).max(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        setup_signal_handlers(shutdown.clone())?;

        info!(poll_interval, "affcast-send loop starting");
        run_loop(&dispatcher, poll_interval, shutdown).await;
        info!("affcast-send loop stopped");
        0
    } else {
        let report = dispatcher.run_cycle().await?;
        println!("{}", summary(&report));
        if report.has_failures() {
            EXIT_CYCLE_FAILURES
        } else {
            0
        }
    };

    db.close().await;
    Ok(code)
}

fn summary(report: &CycleReport) -> String {
    let prefix = if report.dry_run { "[dry run] " } else { "" };
    format!(
        "{}{} due, {} posted, {} failed, {} skipped",
        prefix, report.due, report.posted, report.failed, report.skipped
    )
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| AffcastError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, stopping after the current cycle");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}

async fn run_loop(dispatcher: &Dispatcher, poll_interval: u64, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match dispatcher.run_cycle().await {
            Ok(report) if report.due > 0 => info!("{}", summary(&report)),
            Ok(_) => {}
            // A store error aborts this cycle only; the next poll retries
            Err(e) => error!(error = %e, "Dispatch cycle failed"),
        }

        // Sleep until next poll, checking for shutdown every second
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}
