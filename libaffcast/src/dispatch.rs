//! Scheduled delivery and manual override
//!
//! A dispatch cycle selects every due `pending` entry, resolves its post,
//! attempts each target platform and folds the per-platform results into one
//! status transition. The manual path runs the same attempt/fold logic for a
//! single entry chosen by id, whatever its current status.

use chrono::NaiveDateTime;
use futures::future::join_all;
use std::fmt;
use thiserror::Error;
use tracing::Instrument;

use crate::db::Database;
use crate::error::{AffcastError, PlatformError, Result};
use crate::platforms::Publishers;
use crate::types::{now_local, Platform, Post, QueueEntry, QueuePlatform, QueueStatus};

/// Error text recorded when an entry references a post that no longer exists
pub const POST_NOT_FOUND: &str = "post not found";

/// Why a single platform attempt did not produce an id
#[derive(Debug, Clone, Error)]
pub enum AttemptError {
    #[error("credentials missing")]
    CredentialsMissing,

    #[error("{}", .0.message())]
    Publish(PlatformError),
}

/// Result of delivering one post to one platform
#[derive(Debug, Clone)]
pub struct PlatformAttempt {
    pub platform: Platform,
    pub result: std::result::Result<String, AttemptError>,
    /// The id was already stamped on the post; no call was made
    pub reused: bool,
}

impl PlatformAttempt {
    /// `"IG: rate limited"` style text for a failed attempt
    pub fn error_text(&self) -> Option<String> {
        self.result
            .as_ref()
            .err()
            .map(|e| format!("{}: {}", self.platform.label(), e))
    }
}

/// What happened to one queue entry
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub queue_id: i64,
    pub attempts: Vec<PlatformAttempt>,
    error: Option<String>,
}

impl DeliveryOutcome {
    fn from_attempts(queue_id: i64, attempts: Vec<PlatformAttempt>) -> Self {
        let errors: Vec<String> = attempts.iter().filter_map(|a| a.error_text()).collect();
        let error = if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        };

        Self {
            queue_id,
            attempts,
            error,
        }
    }

    fn post_not_found(queue_id: i64) -> Self {
        Self {
            queue_id,
            attempts: Vec::new(),
            error: Some(POST_NOT_FOUND.to_string()),
        }
    }

    pub fn status(&self) -> QueueStatus {
        if self.error.is_some() {
            QueueStatus::Failed
        } else {
            QueueStatus::Posted
        }
    }

    pub fn is_posted(&self) -> bool {
        self.error.is_none()
    }

    /// Joined, platform-prefixed error text; `None` when every attempt succeeded
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// External ids obtained (or reused) per platform
    pub fn external_ids(&self) -> Vec<(Platform, &str)> {
        self.attempts
            .iter()
            .filter_map(|a| a.result.as_ref().ok().map(|id| (a.platform, id.as_str())))
            .collect()
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(error) => write!(f, "queue entry {} failed: {}", self.queue_id, error),
            None => {
                let ids: Vec<String> = self
                    .external_ids()
                    .iter()
                    .map(|(p, id)| format!("{} {}", p.label(), id))
                    .collect();
                write!(f, "queue entry {} posted ({})", self.queue_id, ids.join(", "))
            }
        }
    }
}

/// Counts for one dispatch cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Entries selected as due
    pub due: usize,
    pub posted: usize,
    pub failed: usize,
    /// Left `pending`: dry run, or not deliverable by the scheduler
    pub skipped: usize,
    pub dry_run: bool,
}

impl CycleReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

enum EntryResult {
    Posted,
    Failed,
    Skipped,
}

pub struct Dispatcher {
    db: Database,
    publishers: Publishers,
    dry_run: bool,
}

impl Dispatcher {
    pub fn new(db: Database, publishers: Publishers) -> Self {
        Self {
            db,
            publishers,
            dry_run: false,
        }
    }

    /// Resolve posts and log intended actions only; no calls, no status changes
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run one cycle against the current local time
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_at(now_local()).await
    }

    /// Run one cycle treating `now` as the current time
    ///
    /// Entries are processed sequentially in due order and each outcome is
    /// written back before the next entry starts. A store error aborts the
    /// cycle; entries not yet reached stay `pending`.
    pub async fn run_cycle_at(&self, now: NaiveDateTime) -> Result<CycleReport> {
        let due = self.db.list_due_at(now).await?;

        let mut report = CycleReport {
            due: due.len(),
            dry_run: self.dry_run,
            ..Default::default()
        };

        if due.is_empty() {
            tracing::info!("No due posts");
            return Ok(report);
        }

        tracing::info!(count = due.len(), dry_run = self.dry_run, "Processing due posts");

        for entry in &due {
            let span = tracing::info_span!(
                "entry",
                queue_id = entry.id,
                post_id = entry.post_id,
                platform = %entry.platform
            );

            match self.process_entry(entry).instrument(span).await? {
                EntryResult::Posted => report.posted += 1,
                EntryResult::Failed => report.failed += 1,
                EntryResult::Skipped => report.skipped += 1,
            }
        }

        tracing::info!(
            due = report.due,
            posted = report.posted,
            failed = report.failed,
            skipped = report.skipped,
            "Dispatch cycle complete"
        );

        Ok(report)
    }

    async fn process_entry(&self, entry: &QueueEntry) -> Result<EntryResult> {
        let post = match self.db.get_post(entry.post_id).await? {
            Some(post) => post,
            None => {
                tracing::warn!("Post not found");
                if self.dry_run {
                    return Ok(EntryResult::Skipped);
                }
                self.db
                    .update_status(entry.id, QueueStatus::Failed, Some(POST_NOT_FOUND), None)
                    .await?;
                return Ok(EntryResult::Failed);
            }
        };

        if entry.platform == QueuePlatform::Facebook {
            tracing::warn!("Facebook entries are only delivered through the manual path; leaving pending");
            return Ok(EntryResult::Skipped);
        }

        tracing::info!(content = %preview(post.content_for(Platform::X)), "Delivering");

        if self.dry_run {
            tracing::info!("[DRY RUN] Skipping publish");
            return Ok(EntryResult::Skipped);
        }

        let outcome = self.deliver(entry, &post, false).await?;
        if outcome.is_posted() {
            Ok(EntryResult::Posted)
        } else {
            Ok(EntryResult::Failed)
        }
    }

    /// Publish one queue entry immediately, overwriting its status
    ///
    /// Reaches every platform value, `facebook` included. Platforms this
    /// entry already delivered to are not called again unless `force` is set.
    pub async fn publish_now(&self, queue_id: i64, force: bool) -> Result<DeliveryOutcome> {
        let entry = self.db.get_entry(queue_id).await?.ok_or_else(|| {
            AffcastError::InvalidInput(format!("Queue entry {} not found", queue_id))
        })?;

        let span = tracing::info_span!(
            "publish_now",
            queue_id = entry.id,
            post_id = entry.post_id,
            platform = %entry.platform
        );

        self.publish_entry(&entry, force).instrument(span).await
    }

    async fn publish_entry(&self, entry: &QueueEntry, force: bool) -> Result<DeliveryOutcome> {
        match self.db.get_post(entry.post_id).await? {
            Some(post) => self.deliver(entry, &post, force).await,
            None => {
                tracing::warn!("Post not found");
                self.db
                    .update_status(entry.id, QueueStatus::Failed, Some(POST_NOT_FOUND), None)
                    .await?;
                Ok(DeliveryOutcome::post_not_found(entry.id))
            }
        }
    }

    /// Attempt every target platform, stamp ids, then record the transition
    async fn deliver(&self, entry: &QueueEntry, post: &Post, force: bool) -> Result<DeliveryOutcome> {
        let targets = entry.platform.targets();
        let attempts =
            join_all(targets.iter().map(|p| self.attempt(*p, entry, post, force))).await;

        for attempt in &attempts {
            match &attempt.result {
                Ok(id) if attempt.reused => {
                    tracing::info!(target_platform = %attempt.platform, external_id = %id, "Already published; not calling again");
                }
                Ok(id) => {
                    self.db.stamp_external_id(post.id, attempt.platform, id).await?;
                    self.db.stamp_entry_external_id(entry.id, attempt.platform, id).await?;
                    tracing::info!(target_platform = %attempt.platform, external_id = %id, "Published");
                }
                Err(e) => {
                    tracing::warn!(target_platform = %attempt.platform, error = %e, "Publish failed");
                }
            }
        }

        let outcome = DeliveryOutcome::from_attempts(entry.id, attempts);
        self.db
            .update_status(entry.id, outcome.status(), outcome.error(), None)
            .await?;

        tracing::info!(status = %outcome.status(), "Entry updated");
        Ok(outcome)
    }

    async fn attempt(
        &self,
        platform: Platform,
        entry: &QueueEntry,
        post: &Post,
        force: bool,
    ) -> PlatformAttempt {
        if !force {
            if let Some(id) = entry.external_id(platform) {
                return PlatformAttempt {
                    platform,
                    result: Ok(id.to_string()),
                    reused: true,
                };
            }
        }

        let result = match self.publishers.get(platform) {
            Some(publisher) if publisher.check_credentials() => publisher
                .publish(post.content_for(platform), post.image_url.as_deref())
                .await
                .map_err(AttemptError::Publish),
            _ => Err(AttemptError::CredentialsMissing),
        };

        PlatformAttempt {
            platform,
            result,
            reused: false,
        }
    }
}

fn preview(content: &str) -> String {
    const MAX: usize = 60;
    if content.chars().count() <= MAX {
        content.to_string()
    } else {
        format!("{}...", content.chars().take(MAX).collect::<String>())
    }
}
