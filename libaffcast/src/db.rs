//! Database operations for Affcast
//!
//! `Database` is the single store handle: it owns the SQLite pool, is opened
//! once at process start and closed explicitly at exit. Every operation is a
//! plain query against it; storage failures surface as
//! [`AffcastError::Database`] so callers can tell "nothing to do" apart from
//! "could not ask".

use chrono::NaiveDateTime;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::error::{AffcastError, DbError, Result};
use crate::types::{
    format_timestamp, now_local, parse_timestamp, EngagementMetrics, NewPost, NewQueueEntry,
    Platform, Post, PostStats, QueueEntry, QueuePlatform, QueueRow, QueueStats, QueueStatus,
};

const QUEUE_COLUMNS: &str = "id, post_id, platform, scheduled_at, status, error_msg, posted_at, \
     created_at, tweet_id, ig_media_id, fb_post_id";

const POST_COLUMNS: &str = "id, product_id, pattern, x_content, ig_content, image_url, \
     tweet_id, ig_media_id, fb_post_id, posted_at, created_at";

/// Error text recorded when an entry is inserted directly as failed
const INSERTED_FAILED_MSG: &str = "marked failed on insert";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database file and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        // Forward slashes work for the SQLite URL on both Windows and Unix;
        // mode=rwc creates the file if it doesn't exist
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    /// Open a private in-memory database
    ///
    /// A single connection is kept alive for the lifetime of the pool; every
    /// new connection would otherwise see its own empty database.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Close the pool, waiting for in-flight queries
    pub async fn close(self) {
        self.pool.close().await;
    }

    // ========================================================================
    // Posts
    // ========================================================================

    /// Insert generated content and return the stored post
    pub async fn create_post(&self, new: &NewPost) -> Result<Post> {
        let created_at = now_local();

        let result = sqlx::query(
            r#"
            INSERT INTO posts (product_id, pattern, x_content, ig_content, image_url, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.product_id)
        .bind(&new.pattern)
        .bind(&new.x_content)
        .bind(&new.ig_content)
        .bind(&new.image_url)
        .bind(format_timestamp(created_at))
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(Post {
            id: result.last_insert_rowid(),
            product_id: new.product_id,
            pattern: new.pattern.clone(),
            x_content: new.x_content.clone(),
            ig_content: new.ig_content.clone(),
            image_url: new.image_url.clone(),
            tweet_id: None,
            ig_media_id: None,
            fb_post_id: None,
            posted_at: None,
            created_at,
        })
    }

    /// Get a post by ID
    pub async fn get_post(&self, post_id: i64) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"))
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.map(|r| post_from_row(&r)).transpose()
    }

    /// All posts, newest first
    pub async fn list_posts(&self) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts ORDER BY id DESC"))
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Posts with at least one platform id stamped, newest first
    pub async fn list_published_posts(&self) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {POST_COLUMNS} FROM posts
            WHERE tweet_id IS NOT NULL OR ig_media_id IS NOT NULL OR fb_post_id IS NOT NULL
            ORDER BY id DESC
            "#
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Edit post text
    ///
    /// Only allowed before the first publish; once any platform id is stamped
    /// the text is frozen.
    pub async fn update_post_content(
        &self,
        post_id: i64,
        x_content: &str,
        ig_content: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE posts SET x_content = ?, ig_content = ?
            WHERE id = ? AND tweet_id IS NULL AND ig_media_id IS NULL AND fb_post_id IS NULL
            "#,
        )
        .bind(x_content)
        .bind(ig_content)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.get_post(post_id).await? {
            None => Err(AffcastError::InvalidInput(format!(
                "Post {} not found",
                post_id
            ))),
            Some(_) => Err(AffcastError::InvalidInput(format!(
                "Post {} is already published and can no longer be edited",
                post_id
            ))),
        }
    }

    /// Record the platform's id for a published post
    ///
    /// Idempotent: stamping the same id again only refreshes `posted_at`.
    pub async fn stamp_external_id(
        &self,
        post_id: i64,
        platform: Platform,
        external_id: &str,
    ) -> Result<()> {
        let column = external_id_column(platform);

        sqlx::query(&format!(
            "UPDATE posts SET {column} = ?, posted_at = ? WHERE id = ?"
        ))
        .bind(external_id)
        .bind(format_timestamp(now_local()))
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ========================================================================
    // Queue
    // ========================================================================

    /// Enqueue a post
    ///
    /// Status defaults to `pending`. An explicit `posted` override gets
    /// `posted_at` set and an explicit `failed` one gets an error message, so
    /// the row satisfies the same invariants as a dispatched one.
    pub async fn add(&self, new: &NewQueueEntry) -> Result<QueueEntry> {
        let created_at = now_local();
        let status = new.status.unwrap_or(QueueStatus::Pending);
        let (error_msg, posted_at) = match status {
            QueueStatus::Pending => (None, None),
            QueueStatus::Posted => (None, Some(created_at)),
            QueueStatus::Failed => (Some(INSERTED_FAILED_MSG.to_string()), None),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO post_queue (post_id, platform, scheduled_at, status, error_msg, posted_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.post_id)
        .bind(new.platform.as_str())
        .bind(format_timestamp(new.scheduled_at))
        .bind(status.as_str())
        .bind(&error_msg)
        .bind(posted_at.map(format_timestamp))
        .bind(format_timestamp(created_at))
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(QueueEntry {
            id: result.last_insert_rowid(),
            post_id: new.post_id,
            platform: new.platform,
            scheduled_at: new.scheduled_at,
            status,
            error_msg,
            posted_at,
            created_at,
            tweet_id: None,
            ig_media_id: None,
            fb_post_id: None,
        })
    }

    /// Record the platform's id on the queue entry whose delivery obtained it
    pub async fn stamp_entry_external_id(
        &self,
        id: i64,
        platform: Platform,
        external_id: &str,
    ) -> Result<bool> {
        let column = external_id_column(platform);

        let result = sqlx::query(&format!("UPDATE post_queue SET {column} = ? WHERE id = ?"))
            .bind(external_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Get a queue entry by ID
    pub async fn get_entry(&self, id: i64) -> Result<Option<QueueEntry>> {
        let row = sqlx::query(&format!("SELECT {QUEUE_COLUMNS} FROM post_queue WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.map(|r| queue_entry_from_row(&r)).transpose()
    }

    /// List queue entries
    ///
    /// With a status filter entries come back earliest-due first; the
    /// unfiltered view is latest-first.
    pub async fn list(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {QUEUE_COLUMNS} FROM post_queue WHERE status = ? ORDER BY scheduled_at ASC, id ASC"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {QUEUE_COLUMNS} FROM post_queue ORDER BY scheduled_at DESC, id DESC"
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(DbError::SqlxError)?;

        rows.iter().map(queue_entry_from_row).collect()
    }

    /// Pending entries due now, earliest first
    pub async fn list_due(&self) -> Result<Vec<QueueEntry>> {
        self.list_due_at(now_local()).await
    }

    /// Pending entries with `scheduled_at <= now`, earliest first
    ///
    /// `now` is bound once into the query so the selection and the comparison
    /// agree on a single instant.
    pub async fn list_due_at(&self, now: NaiveDateTime) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {QUEUE_COLUMNS} FROM post_queue
            WHERE status = 'pending' AND scheduled_at <= ?
            ORDER BY scheduled_at ASC, id ASC
            "#
        ))
        .bind(format_timestamp(now))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(queue_entry_from_row).collect()
    }

    /// Overwrite an entry's status
    ///
    /// - `posted`: `posted_at` is set (given or now), `error_msg` cleared
    /// - `failed`: `error_msg` replaced, `posted_at` cleared
    /// - `pending`: both cleared
    ///
    /// Returns `false` if no entry has this id.
    pub async fn update_status(
        &self,
        id: i64,
        status: QueueStatus,
        error_msg: Option<&str>,
        posted_at: Option<NaiveDateTime>,
    ) -> Result<bool> {
        let (error_msg, posted_at) = match status {
            QueueStatus::Posted => (None, Some(posted_at.unwrap_or_else(now_local))),
            QueueStatus::Failed => (Some(error_msg.unwrap_or("unknown error")), None),
            QueueStatus::Pending => (None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE post_queue SET status = ?, error_msg = ?, posted_at = ? WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error_msg)
        .bind(posted_at.map(format_timestamp))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove an entry regardless of status. The referenced post is untouched.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM post_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Queue entries joined with their post text
    ///
    /// Ordered like [`Database::list`]: latest first when unfiltered, earliest
    /// first for a single status. Entries whose post is missing are still
    /// listed with empty text.
    pub async fn list_with_posts(&self, status: Option<QueueStatus>) -> Result<Vec<QueueRow>> {
        let mut sql = String::from(
            r#"
            SELECT
                q.id AS queue_id, q.post_id, q.platform, q.scheduled_at, q.status,
                q.error_msg, q.posted_at, q.created_at,
                COALESCE(p.pattern, '') AS pattern,
                COALESCE(p.x_content, '') AS x_content,
                COALESCE(p.ig_content, '') AS ig_content
            FROM post_queue q
            LEFT JOIN posts p ON q.post_id = p.id
            "#,
        );
        if status.is_some() {
            sql.push_str(" WHERE q.status = ? ORDER BY q.scheduled_at ASC, q.id ASC");
        } else {
            sql.push_str(" ORDER BY q.scheduled_at DESC, q.id DESC");
        }

        let mut query = sqlx::query(&sql);
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }

        let rows = query.fetch_all(&self.pool).await.map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                Ok(QueueRow {
                    queue_id: r.get("queue_id"),
                    post_id: r.get("post_id"),
                    platform: parse_column(r, "post_queue", "platform")?,
                    scheduled_at: timestamp_column(r, "post_queue", "scheduled_at")?,
                    status: parse_column(r, "post_queue", "status")?,
                    error_msg: r.get("error_msg"),
                    posted_at: optional_timestamp_column(r, "post_queue", "posted_at")?,
                    created_at: timestamp_column(r, "post_queue", "created_at")?,
                    pattern: r.get("pattern"),
                    x_content: r.get("x_content"),
                    ig_content: r.get("ig_content"),
                })
            })
            .collect()
    }

    /// Counts per status, plus pending entries already past their schedule
    pub async fn queue_stats(&self, now: NaiveDateTime) -> Result<QueueStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM post_queue GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let mut stats = QueueStats::default();
        for r in &rows {
            let n: i64 = r.get("n");
            match parse_column::<QueueStatus>(r, "post_queue", "status")? {
                QueueStatus::Pending => stats.pending = n,
                QueueStatus::Posted => stats.posted = n,
                QueueStatus::Failed => stats.failed = n,
            }
        }

        stats.overdue = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM post_queue WHERE status = 'pending' AND scheduled_at < ?",
        )
        .bind(format_timestamp(now))
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(stats)
    }

    // ========================================================================
    // Engagement stats
    // ========================================================================

    /// Append an engagement snapshot
    pub async fn add_post_stats(
        &self,
        post_id: i64,
        platform: Platform,
        metrics: EngagementMetrics,
    ) -> Result<PostStats> {
        let recorded_at = now_local();

        let result = sqlx::query(
            r#"
            INSERT INTO post_stats (post_id, platform, likes, reposts, comments, impressions, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(post_id)
        .bind(platform.as_str())
        .bind(metrics.likes)
        .bind(metrics.reposts)
        .bind(metrics.comments)
        .bind(metrics.impressions)
        .bind(format_timestamp(recorded_at))
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(PostStats {
            id: result.last_insert_rowid(),
            post_id,
            platform,
            metrics,
            recorded_at,
        })
    }

    /// Engagement snapshots, newest first, optionally for one post
    pub async fn list_post_stats(&self, post_id: Option<i64>) -> Result<Vec<PostStats>> {
        let mut sql = String::from(
            "SELECT id, post_id, platform, likes, reposts, comments, impressions, recorded_at FROM post_stats",
        );
        if post_id.is_some() {
            sql.push_str(" WHERE post_id = ?");
        }
        sql.push_str(" ORDER BY recorded_at DESC, id DESC");

        let mut query = sqlx::query(&sql);
        if let Some(id) = post_id {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                Ok(PostStats {
                    id: r.get("id"),
                    post_id: r.get("post_id"),
                    platform: parse_column(r, "post_stats", "platform")?,
                    metrics: EngagementMetrics {
                        likes: r.get("likes"),
                        reposts: r.get("reposts"),
                        comments: r.get("comments"),
                        impressions: r.get("impressions"),
                    },
                    recorded_at: timestamp_column(r, "post_stats", "recorded_at")?,
                })
            })
            .collect()
    }
}

fn corrupt(table: &'static str, detail: String) -> AffcastError {
    DbError::CorruptRow { table, detail }.into()
}

fn parse_column<T>(row: &SqliteRow, table: &'static str, column: &str) -> Result<T>
where
    T: FromStr,
{
    let raw: String = row.get(column);
    raw.parse()
        .map_err(|_| corrupt(table, format!("unexpected {} '{}'", column, raw)))
}

fn timestamp_column(row: &SqliteRow, table: &'static str, column: &str) -> Result<NaiveDateTime> {
    let raw: String = row.get(column);
    parse_timestamp(&raw).ok_or_else(|| corrupt(table, format!("bad {} '{}'", column, raw)))
}

fn optional_timestamp_column(
    row: &SqliteRow,
    table: &'static str,
    column: &str,
) -> Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(column);
    raw.map(|s| parse_timestamp(&s).ok_or_else(|| corrupt(table, format!("bad {} '{}'", column, s))))
        .transpose()
}

fn queue_entry_from_row(r: &SqliteRow) -> Result<QueueEntry> {
    Ok(QueueEntry {
        id: r.get("id"),
        post_id: r.get("post_id"),
        platform: parse_column::<QueuePlatform>(r, "post_queue", "platform")?,
        scheduled_at: timestamp_column(r, "post_queue", "scheduled_at")?,
        status: parse_column::<QueueStatus>(r, "post_queue", "status")?,
        error_msg: r.get("error_msg"),
        posted_at: optional_timestamp_column(r, "post_queue", "posted_at")?,
        created_at: timestamp_column(r, "post_queue", "created_at")?,
        tweet_id: r.get("tweet_id"),
        ig_media_id: r.get("ig_media_id"),
        fb_post_id: r.get("fb_post_id"),
    })
}

fn external_id_column(platform: Platform) -> &'static str {
    match platform {
        Platform::X => "tweet_id",
        Platform::Instagram => "ig_media_id",
        Platform::Facebook => "fb_post_id",
    }
}

fn post_from_row(r: &SqliteRow) -> Result<Post> {
    Ok(Post {
        id: r.get("id"),
        product_id: r.get("product_id"),
        pattern: r.get("pattern"),
        x_content: r.get("x_content"),
        ig_content: r.get("ig_content"),
        image_url: r.get("image_url"),
        tweet_id: r.get("tweet_id"),
        ig_media_id: r.get("ig_media_id"),
        fb_post_id: r.get("fb_post_id"),
        posted_at: optional_timestamp_column(r, "posts", "posted_at")?,
        created_at: timestamp_column(r, "posts", "created_at")?,
    })
}
