//! affcast-queue - Manage the post queue
//!
//! Unix-style tool for enqueueing, inspecting and manually sending queue
//! entries.

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use libaffcast::logging::{LogFormat, LoggingConfig};
use libaffcast::platforms::Publishers;
use libaffcast::scheduling::parse_schedule;
use libaffcast::types::{format_timestamp, now_local};
use libaffcast::{
    AffcastError, Config, Database, Dispatcher, NewQueueEntry, QueueEntry, QueuePlatform,
    QueueRow, QueueStatus, Result,
};

/// Exit code when a manual send completed with a failed outcome
const EXIT_DELIVERY_FAILED: i32 = 4;

#[derive(Parser, Debug)]
#[command(name = "affcast-queue")]
#[command(version)]
#[command(about = "Manage the affiliate post queue")]
#[command(long_about = "\
affcast-queue - Manage the affiliate post queue

DESCRIPTION:
    affcast-queue schedules generated posts for delivery and inspects the
    queue. Entries move from pending to posted or failed; failed entries
    are only retried when sent manually with `now`.

COMMANDS:
    add      Schedule a post for a platform
    list     List queue entries with their post text
    due      List pending entries whose time has come
    show     Show one entry in detail
    now      Send an entry immediately (any platform, including facebook)
    delete   Remove an entry (the post itself is kept)
    stats    Show counts per status

USAGE EXAMPLES:
    # Post 12 to X and Instagram tomorrow morning
    affcast-queue add 12 --platform both --at \"tomorrow 9am\"

    # Post 12 to X in two hours
    affcast-queue add 12 --platform x --at 2h

    # Failed entries as JSON
    affcast-queue list --status failed --format json

    # Retry entry 7 now
    affcast-queue now 7

CONFIGURATION:
    Configuration file: ~/.config/affcast/config.toml
    Database location: ~/.local/share/affcast/affcast.db

    Override with environment variables:
        AFFCAST_CONFIG    - Path to config file
        AFFCAST_DB_PATH   - Path to database file

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Authentication error
    3 - Invalid input (unknown entry, bad platform, time format, etc.)
    4 - Manual send completed but the entry failed
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
    /// Schedule a post for delivery
    Add {
        /// Post ID to schedule
        post_id: i64,

        /// Target: x, instagram, facebook or both
        #[arg(short, long)]
        platform: String,

        /// When to send (e.g. "2025-07-01T09:00:00", "2h", "tomorrow 9am")
        #[arg(short, long)]
        at: String,

        /// Initial status (defaults to pending)
        #[arg(long)]
        status: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List queue entries
    List {
        /// Filter by status: pending, posted or failed
        #[arg(short, long)]
        status: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List entries due for delivery
    Due {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show one entry
    Show {
        /// Queue entry ID
        id: i64,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Send an entry immediately
    Now {
        /// Queue entry ID
        id: i64,

        /// Republish to platforms that already have an id for this post
        #[arg(long)]
        force: bool,
    },

    /// Delete an entry
    Delete {
        /// Queue entry ID
        id: i64,
    },

    /// Show queue statistics
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_format(format: &str) -> Result<OutputFormat> {
    match format {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        _ => Err(AffcastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        ))),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Quiet unless asked: stdout carries the command output
    let mut logging = LoggingConfig::from_env(cli.log_format, cli.verbose);
    if !cli.verbose && std::env::var("AFFCAST_LOG_LEVEL").is_err() {
        logging.level = "warn".to_string();
    }
    logging.init();

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
        Commands::Add {
            post_id,
            platform,
            at,
            status,
            format,
        } => {
            cmd_add(&db, post_id, &platform, &at, status.as_deref(), &format).await?;
            0
        }
        Commands::List { status, format } => {
            cmd_list(&db, status.as_deref(), &format).await?;
            0
        }
        Commands::Due { format } => {
            cmd_due(&db, &format).await?;
            0
        }
        Commands::Show { id, format } => {
            cmd_show(&db, id, &format).await?;
            0
        }
        Commands::Now { id, force } => cmd_now(&config, &db, id, force).await?,
        Commands::Delete { id } => {
            cmd_delete(&db, id).await?;
            0
        }
        Commands::Stats { format } => {
            cmd_stats(&db, &format).await?;
            0
        }
    };

    db.close().await;
    Ok(code)
}

/// Enqueue a post
async fn cmd_add(
    db: &Database,
    post_id: i64,
    platform: &str,
    at: &str,
    status: Option<&str>,
    format: &str,
) -> Result<()> {
    let format = parse_format(format)?;
    let platform: QueuePlatform = platform.parse()?;
    let scheduled_at = parse_schedule(at, now_local())?;

    let mut new = NewQueueEntry::new(post_id, platform, scheduled_at);
    if let Some(status) = status {
        new = new.with_status(status.parse()?);
    }

    if db.get_post(post_id).await?.is_none() {
        tracing::warn!(post_id, "Post does not exist; the entry will fail when sent");
    }

    let entry = db.add(&new).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entry)?),
        OutputFormat::Text => println!(
            "Queued entry {}: post {} -> {} at {}",
            entry.id,
            entry.post_id,
            entry.platform,
            format_timestamp(entry.scheduled_at)
        ),
    }

    Ok(())
}

/// List entries joined with their post text
async fn cmd_list(db: &Database, status: Option<&str>, format: &str) -> Result<()> {
    let format = parse_format(format)?;
    let status = status.map(|s| s.parse::<QueueStatus>()).transpose()?;

    let rows = db.list_with_posts(status).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Text => output_rows_text(&rows),
    }

    Ok(())
}

fn output_rows_text(rows: &[QueueRow]) {
    let now = now_local();

    for row in rows {
        println!(
            "{} | {} | {} | {} | {} | {}",
            row.queue_id,
            row.platform,
            row.status,
            format_timestamp(row.scheduled_at),
            row_timing(row, now),
            truncate_content(&row.x_content, 50)
        );

        if let Some(error) = &row.error_msg {
            println!("    error: {}", error);
        }
    }
}

fn row_timing(row: &QueueRow, now: NaiveDateTime) -> String {
    if row.is_overdue(now) {
        return "overdue".to_string();
    }

    match row.status {
        QueueStatus::Pending => format_time_until(now, row.scheduled_at),
        QueueStatus::Posted => row
            .posted_at
            .map(|ts| format!("posted {}", format_timestamp(ts)))
            .unwrap_or_else(|| "posted".to_string()),
        QueueStatus::Failed => "failed".to_string(),
    }
}

/// List pending entries at or past their schedule
async fn cmd_due(db: &Database, format: &str) -> Result<()> {
    let format = parse_format(format)?;
    let entries = db.list_due().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => output_entries_text(&entries),
    }

    Ok(())
}

fn output_entries_text(entries: &[QueueEntry]) {
    let now = now_local();

    for entry in entries {
        println!(
            "{} | post {} | {} | {} | {}",
            entry.id,
            entry.post_id,
            entry.platform,
            format_timestamp(entry.scheduled_at),
            format_time_until(now, entry.scheduled_at)
        );
    }
}

/// Show one entry with its post
async fn cmd_show(db: &Database, id: i64, format: &str) -> Result<()> {
    let format = parse_format(format)?;
    let entry = db
        .get_entry(id)
        .await?
        .ok_or_else(|| AffcastError::InvalidInput(format!("Queue entry {} not found", id)))?;
    let post = db.get_post(entry.post_id).await?;

    if format == OutputFormat::Json {
        let value = serde_json::json!({ "entry": entry, "post": post });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let dash = || "-".to_string();
    println!("Queue entry {}", entry.id);
    println!("  platform:   {}", entry.platform);
    println!("  status:     {}", entry.status);
    println!(
        "  scheduled:  {} ({})",
        format_timestamp(entry.scheduled_at),
        format_time_until(now_local(), entry.scheduled_at)
    );
    println!(
        "  posted at:  {}",
        entry.posted_at.map(format_timestamp).unwrap_or_else(dash)
    );
    println!("  error:      {}", entry.error_msg.clone().unwrap_or_else(dash));

    match post {
        Some(post) => {
            println!("  post:       {} ({})", post.id, post.pattern);
            println!("  X text:     {}", post.x_content);
            println!("  IG text:    {}", post.ig_content);
            if let Some(url) = &post.image_url {
                println!("  image:      {}", url);
            }
            println!("  tweet id:   {}", post.tweet_id.clone().unwrap_or_else(dash));
            println!("  IG id:      {}", post.ig_media_id.clone().unwrap_or_else(dash));
            println!("  FB id:      {}", post.fb_post_id.clone().unwrap_or_else(dash));
        }
        None => println!("  post:       {} (not found)", entry.post_id),
    }

    Ok(())
}

/// Send one entry immediately
async fn cmd_now(config: &Config, db: &Database, id: i64, force: bool) -> Result<i32> {
    let publishers = Publishers::from_config(config)?;
    let dispatcher = Dispatcher::new(db.clone(), publishers);

    let outcome = dispatcher.publish_now(id, force).await?;
    if outcome.is_posted() {
        println!("{}", outcome);
        Ok(0)
    } else {
        eprintln!("{}", outcome);
        Ok(EXIT_DELIVERY_FAILED)
    }
}

/// Delete one entry
async fn cmd_delete(db: &Database, id: i64) -> Result<()> {
    if !db.delete(id).await? {
        return Err(AffcastError::InvalidInput(format!(
            "Queue entry {} not found",
            id
        )));
    }

    println!("Deleted queue entry {}", id);
    Ok(())
}

/// Show queue statistics
async fn cmd_stats(db: &Database, format: &str) -> Result<()> {
    let format = parse_format(format)?;
    let stats = db.queue_stats(now_local()).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => {
            println!("Pending: {}", stats.pending);
            println!("Posted:  {}", stats.posted);
            println!("Failed:  {}", stats.failed);
            println!("Overdue: {}", stats.overdue);
            println!("Total:   {}", stats.total());
        }
    }

    Ok(())
}

/// Truncate content to max characters with ellipsis
fn truncate_content(content: &str, max_len: usize) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() <= max_len {
        single_line
    } else {
        let head: String = single_line.chars().take(max_len).collect();
        format!("{}...", head)
    }
}

/// Format time until scheduled time in human-readable format
fn format_time_until(now: NaiveDateTime, scheduled_at: NaiveDateTime) -> String {
    let diff = (scheduled_at - now).num_seconds();

    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}
