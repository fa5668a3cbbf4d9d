//! Core types for Affcast

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AffcastError;

/// Storage format for every timestamp: naive local time, second precision.
///
/// Fixed width so that SQL text comparison orders chronologically.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Format a timestamp for storage
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored or user-supplied ISO-8601 timestamp
///
/// Accepts the storage format plus fractional seconds and a space separator,
/// which is what older rows and hand-typed values tend to look like.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Current local time, truncated to storage precision
pub fn now_local() -> NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// A concrete delivery platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    X,
    Instagram,
    Facebook,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::X, Platform::Instagram, Platform::Facebook];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::X => "x",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
        }
    }

    /// Short prefix used when folding errors into a queue entry's `error_msg`
    pub fn label(&self) -> &'static str {
        match self {
            Platform::X => "X",
            Platform::Instagram => "IG",
            Platform::Facebook => "FB",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = AffcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x" | "twitter" => Ok(Platform::X),
            "instagram" | "ig" => Ok(Platform::Instagram),
            "facebook" | "fb" => Ok(Platform::Facebook),
            _ => Err(AffcastError::InvalidInput(format!(
                "Unknown platform '{}'. Valid options: x, instagram, facebook",
                s
            ))),
        }
    }
}

/// Target of a queue entry
///
/// `Both` delivers to X and Instagram as two independent sub-attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuePlatform {
    X,
    Instagram,
    Facebook,
    Both,
}

impl QueuePlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueuePlatform::X => "x",
            QueuePlatform::Instagram => "instagram",
            QueuePlatform::Facebook => "facebook",
            QueuePlatform::Both => "both",
        }
    }

    /// Every platform this entry addresses, in delivery order
    pub fn targets(&self) -> Vec<Platform> {
        match self {
            QueuePlatform::X => vec![Platform::X],
            QueuePlatform::Instagram => vec![Platform::Instagram],
            QueuePlatform::Facebook => vec![Platform::Facebook],
            QueuePlatform::Both => vec![Platform::X, Platform::Instagram],
        }
    }
}

impl std::fmt::Display for QueuePlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QueuePlatform {
    type Err = AffcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x" => Ok(QueuePlatform::X),
            "instagram" => Ok(QueuePlatform::Instagram),
            "facebook" => Ok(QueuePlatform::Facebook),
            "both" => Ok(QueuePlatform::Both),
            _ => Err(AffcastError::InvalidInput(format!(
                "Unknown queue platform '{}'. Valid options: x, instagram, facebook, both",
                s
            ))),
        }
    }
}

/// Status of a queue entry
///
/// `pending -> {posted, failed}`; `failed` may be retried into either state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Posted,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Posted => "posted",
            QueueStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = AffcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(QueueStatus::Pending),
            "posted" => Ok(QueueStatus::Posted),
            "failed" => Ok(QueueStatus::Failed),
            _ => Err(AffcastError::InvalidInput(format!(
                "Unknown status '{}'. Valid options: pending, posted, failed",
                s
            ))),
        }
    }
}

/// Generated post content
///
/// Created once by the content generator. Text is editable until the first
/// publish; the platform ids are stamped as a side effect of delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub product_id: Option<i64>,
    pub pattern: String,
    pub x_content: String,
    pub ig_content: String,
    pub image_url: Option<String>,
    pub tweet_id: Option<String>,
    pub ig_media_id: Option<String>,
    pub fb_post_id: Option<String>,
    pub posted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl Post {
    /// Text rendered for the given platform
    ///
    /// Facebook reuses the Instagram rendering.
    pub fn content_for(&self, platform: Platform) -> &str {
        match platform {
            Platform::X => &self.x_content,
            Platform::Instagram | Platform::Facebook => &self.ig_content,
        }
    }

    /// External id stamped for the given platform, if already published there
    pub fn external_id(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::X => self.tweet_id.as_deref(),
            Platform::Instagram => self.ig_media_id.as_deref(),
            Platform::Facebook => self.fb_post_id.as_deref(),
        }
    }

    pub fn is_published(&self) -> bool {
        Platform::ALL.iter().any(|p| self.external_id(*p).is_some())
    }
}

/// Content to insert as a new post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub product_id: Option<i64>,
    pub pattern: String,
    pub x_content: String,
    pub ig_content: String,
    pub image_url: Option<String>,
}

impl NewPost {
    pub fn new(pattern: &str, x_content: &str, ig_content: &str) -> Self {
        Self {
            product_id: None,
            pattern: pattern.to_string(),
            x_content: x_content.to_string(),
            ig_content: ig_content.to_string(),
            image_url: None,
        }
    }
}

/// A scheduled intent to publish a post to a platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub post_id: i64,
    pub platform: QueuePlatform,
    pub scheduled_at: NaiveDateTime,
    pub status: QueueStatus,
    pub error_msg: Option<String>,
    pub posted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    /// Ids this entry's own deliveries obtained
    pub tweet_id: Option<String>,
    pub ig_media_id: Option<String>,
    pub fb_post_id: Option<String>,
}

impl QueueEntry {
    /// External id this entry already obtained for the platform
    pub fn external_id(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::X => self.tweet_id.as_deref(),
            Platform::Instagram => self.ig_media_id.as_deref(),
            Platform::Facebook => self.fb_post_id.as_deref(),
        }
    }
}

/// Fields required to enqueue a post
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub post_id: i64,
    pub platform: QueuePlatform,
    pub scheduled_at: NaiveDateTime,
    /// Defaults to `Pending` when not set
    pub status: Option<QueueStatus>,
}

impl NewQueueEntry {
    pub fn new(post_id: i64, platform: QueuePlatform, scheduled_at: NaiveDateTime) -> Self {
        Self {
            post_id,
            platform,
            scheduled_at,
            status: None,
        }
    }

    pub fn with_status(mut self, status: QueueStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Read-only display row joining a queue entry with its post text
#[derive(Debug, Clone, Serialize)]
pub struct QueueRow {
    pub queue_id: i64,
    pub post_id: i64,
    pub platform: QueuePlatform,
    pub scheduled_at: NaiveDateTime,
    pub status: QueueStatus,
    pub error_msg: Option<String>,
    pub posted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub pattern: String,
    pub x_content: String,
    pub ig_content: String,
}

impl QueueRow {
    pub fn is_overdue(&self, now: NaiveDateTime) -> bool {
        self.status == QueueStatus::Pending && self.scheduled_at < now
    }
}

/// Queue counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub posted: i64,
    pub failed: i64,
    /// Pending entries whose scheduled time has already passed
    pub overdue: i64,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.pending + self.posted + self.failed
    }
}

/// Engagement counters reported by a platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub likes: i64,
    pub reposts: i64,
    pub comments: i64,
    pub impressions: i64,
}

/// A stored engagement snapshot
#[derive(Debug, Clone, Serialize)]
pub struct PostStats {
    pub id: i64,
    pub post_id: i64,
    pub platform: Platform,
    #[serde(flatten)]
    pub metrics: EngagementMetrics,
    pub recorded_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_timestamp_round_trips_through_storage_format() {
        let t = ts(9, 0);
        assert_eq!(format_timestamp(t), "2025-01-01T09:00:00");
        assert_eq!(parse_timestamp("2025-01-01T09:00:00"), Some(t));
    }

    #[test]
    fn test_parse_timestamp_accepts_common_variants() {
        assert_eq!(parse_timestamp("2025-01-01 09:00:00"), Some(ts(9, 0)));
        assert_eq!(parse_timestamp("2025-01-01T09:00"), Some(ts(9, 0)));
        assert!(parse_timestamp("2025-01-01T09:00:00.123456").is_some());
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_storage_format_sorts_chronologically() {
        let earlier = format_timestamp(ts(9, 0));
        let later = format_timestamp(ts(10, 30));
        assert!(earlier < later);
    }

    #[test]
    fn test_queue_platform_targets() {
        assert_eq!(QueuePlatform::X.targets(), vec![Platform::X]);
        assert_eq!(QueuePlatform::Instagram.targets(), vec![Platform::Instagram]);
        assert_eq!(QueuePlatform::Facebook.targets(), vec![Platform::Facebook]);
        assert_eq!(
            QueuePlatform::Both.targets(),
            vec![Platform::X, Platform::Instagram]
        );
    }

    #[test]
    fn test_queue_platform_from_str() {
        assert_eq!("both".parse::<QueuePlatform>().unwrap(), QueuePlatform::Both);
        assert_eq!("X".parse::<QueuePlatform>().unwrap(), QueuePlatform::X);
        assert!("mastodon".parse::<QueuePlatform>().is_err());
    }

    #[test]
    fn test_queue_status_from_str_and_display() {
        for status in [QueueStatus::Pending, QueueStatus::Posted, QueueStatus::Failed] {
            assert_eq!(status.to_string().parse::<QueueStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<QueueStatus>().is_err());
    }

    #[test]
    fn test_platform_labels() {
        assert_eq!(Platform::X.label(), "X");
        assert_eq!(Platform::Instagram.label(), "IG");
        assert_eq!(Platform::Facebook.label(), "FB");
        assert_eq!("ig".parse::<Platform>().unwrap(), Platform::Instagram);
    }

    #[test]
    fn test_post_content_and_external_ids() {
        let post = Post {
            id: 10,
            product_id: None,
            pattern: "tips".to_string(),
            x_content: "short".to_string(),
            ig_content: "long caption".to_string(),
            image_url: None,
            tweet_id: Some("t123".to_string()),
            ig_media_id: None,
            fb_post_id: None,
            posted_at: Some(ts(9, 5)),
            created_at: ts(8, 0),
        };

        assert_eq!(post.content_for(Platform::X), "short");
        assert_eq!(post.content_for(Platform::Instagram), "long caption");
        assert_eq!(post.content_for(Platform::Facebook), "long caption");
        assert_eq!(post.external_id(Platform::X), Some("t123"));
        assert_eq!(post.external_id(Platform::Instagram), None);
        assert!(post.is_published());
    }

    #[test]
    fn test_queue_entry_external_ids() {
        let entry = QueueEntry {
            id: 1,
            post_id: 10,
            platform: QueuePlatform::Both,
            scheduled_at: ts(9, 0),
            status: QueueStatus::Failed,
            error_msg: Some("IG: rate limited".to_string()),
            posted_at: None,
            created_at: ts(8, 0),
            tweet_id: Some("t1".to_string()),
            ig_media_id: None,
            fb_post_id: None,
        };

        assert_eq!(entry.external_id(Platform::X), Some("t1"));
        assert_eq!(entry.external_id(Platform::Instagram), None);
        assert_eq!(entry.external_id(Platform::Facebook), None);
    }

    #[test]
    fn test_queue_row_overdue() {
        let row = QueueRow {
            queue_id: 1,
            post_id: 10,
            platform: QueuePlatform::X,
            scheduled_at: ts(9, 0),
            status: QueueStatus::Pending,
            error_msg: None,
            posted_at: None,
            created_at: ts(8, 0),
            pattern: "tips".to_string(),
            x_content: "short".to_string(),
            ig_content: "long".to_string(),
        };

        assert!(row.is_overdue(ts(9, 1)));
        assert!(!row.is_overdue(ts(9, 0)));

        let posted = QueueRow {
            status: QueueStatus::Posted,
            ..row
        };
        assert!(!posted.is_overdue(ts(9, 1)));
    }

    #[test]
    fn test_queue_stats_total() {
        let stats = QueueStats {
            pending: 2,
            posted: 3,
            failed: 1,
            overdue: 1,
        };
        assert_eq!(stats.total(), 6);
    }
}
