//! Engagement metrics refresh
//!
//! Walks every published post, asks each platform it was published to for
//! current counters and appends a snapshot to `post_stats`. One failing
//! platform never stops the others.

use crate::db::Database;
use crate::error::Result;
use crate::platforms::Publishers;
use crate::types::Platform;

/// Counts for one refresh run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Snapshots written
    pub recorded: usize,
    /// Platforms without a configured publisher
    pub skipped: usize,
    /// One line per failed fetch: `"post 3 IG: message"`
    pub errors: Vec<String>,
}

impl RefreshReport {
    pub fn failed(&self) -> usize {
        self.errors.len()
    }
}

/// Fetch and store metrics for every published post
///
/// `only` restricts the run to a single platform.
pub async fn refresh_metrics(
    db: &Database,
    publishers: &Publishers,
    only: Option<Platform>,
) -> Result<RefreshReport> {
    let posts = db.list_published_posts().await?;
    let mut report = RefreshReport::default();

    tracing::info!(posts = posts.len(), "Refreshing engagement metrics");

    for post in &posts {
        for platform in Platform::ALL {
            if only.is_some_and(|p| p != platform) {
                continue;
            }

            let Some(external_id) = post.external_id(platform) else {
                continue;
            };

            let publisher = match publishers.get(platform) {
                Some(p) if p.check_credentials() => p,
                _ => {
                    tracing::debug!(post_id = post.id, %platform, "Credentials missing; skipping");
                    report.skipped += 1;
                    continue;
                }
            };

            match publisher.fetch_metrics(external_id).await {
                Ok(metrics) => {
                    db.add_post_stats(post.id, platform, metrics).await?;
                    tracing::info!(
                        post_id = post.id,
                        %platform,
                        likes = metrics.likes,
                        reposts = metrics.reposts,
                        comments = metrics.comments,
                        impressions = metrics.impressions,
                        "Metrics recorded"
                    );
                    report.recorded += 1;
                }
                Err(e) => {
                    tracing::warn!(post_id = post.id, %platform, error = %e, "Metrics fetch failed");
                    report
                        .errors
                        .push(format!("post {} {}: {}", post.id, platform.label(), e.message()));
                }
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::platforms::MockPublisher;
    use crate::types::{EngagementMetrics, NewPost};

    fn metrics(likes: i64) -> EngagementMetrics {
        EngagementMetrics {
            likes,
            reposts: 1,
            comments: 2,
            impressions: 0,
        }
    }

    #[tokio::test]
    async fn test_refresh_records_published_platforms_only() {
        let db = Database::open_in_memory().await.unwrap();
        let published = db.create_post(&NewPost::new("p", "x", "ig")).await.unwrap();
        db.stamp_external_id(published.id, Platform::X, "t1").await.unwrap();
        // Never published: ignored
        db.create_post(&NewPost::new("q", "x", "ig")).await.unwrap();

        let x = MockPublisher::success(Platform::X, "t1").with_metrics(metrics(10));
        let ig = MockPublisher::success(Platform::Instagram, "m1");
        let publishers = Publishers::new().with(x.clone()).with(ig.clone());

        let report = refresh_metrics(&db, &publishers, None).await.unwrap();

        assert_eq!(report.recorded, 1);
        assert_eq!(x.metrics_call_count(), 1);
        assert_eq!(ig.metrics_call_count(), 0);

        let stats = db.list_post_stats(Some(published.id)).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].platform, Platform::X);
        assert_eq!(stats[0].metrics.likes, 10);
    }

    #[tokio::test]
    async fn test_refresh_continues_after_failure() {
        let db = Database::open_in_memory().await.unwrap();
        let post = db.create_post(&NewPost::new("p", "x", "ig")).await.unwrap();
        db.stamp_external_id(post.id, Platform::X, "t1").await.unwrap();
        db.stamp_external_id(post.id, Platform::Instagram, "m1").await.unwrap();

        let x = MockPublisher::success(Platform::X, "t1")
            .with_metrics_error(PlatformError::RateLimit("slow down".to_string()));
        let ig = MockPublisher::success(Platform::Instagram, "m1").with_metrics(metrics(4));
        let publishers = Publishers::new().with(x).with(ig);

        let report = refresh_metrics(&db, &publishers, None).await.unwrap();

        assert_eq!(report.recorded, 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.errors[0], format!("post {} X: slow down", post.id));
    }

    #[tokio::test]
    async fn test_refresh_platform_filter_and_missing_credentials() {
        let db = Database::open_in_memory().await.unwrap();
        let post = db.create_post(&NewPost::new("p", "x", "ig")).await.unwrap();
        db.stamp_external_id(post.id, Platform::X, "t1").await.unwrap();
        db.stamp_external_id(post.id, Platform::Facebook, "1_2").await.unwrap();

        let x = MockPublisher::success(Platform::X, "t1");
        let fb = MockPublisher::without_credentials(Platform::Facebook);
        let publishers = Publishers::new().with(x.clone()).with(fb);

        let report = refresh_metrics(&db, &publishers, Some(Platform::Facebook))
            .await
            .unwrap();

        assert_eq!(report.recorded, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(x.metrics_call_count(), 0);
    }
}
