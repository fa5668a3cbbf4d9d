//! affcast-metrics - Engagement metrics for published posts

use clap::{Parser, Subcommand};
use libaffcast::logging::{LogFormat, LoggingConfig};
use libaffcast::metrics::refresh_metrics;
use libaffcast::platforms::Publishers;
use libaffcast::types::{format_timestamp, PostStats};
use libaffcast::{AffcastError, Config, Database, Platform, Result};

/// Exit code when a refresh completed but some fetches failed
const EXIT_FETCH_FAILURES: i32 = 4;

#[derive(Parser, Debug)]
#[command(name = "affcast-metrics")]
#[command(version)]
#[command(about = "Refresh and show engagement metrics")]
#[command(long_about = "\
affcast-metrics - Refresh and show engagement metrics

DESCRIPTION:
    affcast-metrics asks X, Instagram and Facebook for the current likes,
    reposts, comments and impressions of every published post and stores a
    timestamped snapshot. Snapshots are append-only.

USAGE EXAMPLES:
    # Refresh every platform
    affcast-metrics refresh

    # Refresh X only
    affcast-metrics refresh --platform x

    # Snapshots for post 12 as JSON
    affcast-metrics show 12 --format json

EXIT CODES:
    0 - Success
    1 - Operation failed
    3 - Invalid input
    4 - Refresh completed but some fetches failed
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format: text, json or pretty
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch current metrics for every published post
    Refresh {
        /// Only refresh one platform: x, instagram or facebook
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// Show stored metrics snapshots, newest first
    Show {
        /// Only show snapshots for this post
        post_id: Option<i64>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
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

    let code = match cli.command {
        Commands::Refresh { platform } => cmd_refresh(&config, &db, platform.as_deref()).await?,
        Commands::Show { post_id, format } => {
            cmd_show(&db, post_id, &format).await?;
            0
        }
    };

    db.close().await;
    Ok(code)
}

async fn cmd_refresh(config: &Config, db: &Database, platform: Option<&str>) -> Result<i32> {
    let only = platform.map(|p| p.parse::<Platform>()).transpose()?;
    let publishers = Publishers::from_config(config)?;

    let report = refresh_metrics(db, &publishers, only).await?;

    for error in &report.errors {
        eprintln!("{}", error);
    }
    println!(
        "{} recorded, {} failed, {} skipped",
        report.recorded,
        report.failed(),
        report.skipped
    );

    if report.errors.is_empty() {
        Ok(0)
    } else {
        Ok(EXIT_FETCH_FAILURES)
    }
}

async fn cmd_show(db: &Database, post_id: Option<i64>, format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(AffcastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }

    let stats = db.list_post_stats(post_id).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        for line in stats.iter().map(stats_line) {
            println!("{}", line);
        }
    }

    Ok(())
}

fn stats_line(s: &PostStats) -> String {
    format!(
        "{} | post {} | {} | likes {} | reposts {} | comments {} | impressions {}",
        format_timestamp(s.recorded_at),
        s.post_id,
        s.platform,
        s.metrics.likes,
        s.metrics.reposts,
        s.metrics.comments,
        s.metrics.impressions
    )
}
