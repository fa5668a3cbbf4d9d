//! Mock publisher for testing
//!
//! Simulates successes, failures and missing credentials without network
//! access. Counters live behind `Arc<Mutex<_>>`, so a clone kept by the test
//! observes calls made through the copy handed to the dispatcher.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::PlatformError;
use crate::platforms::{PublishResult, Publisher};
use crate::types::{EngagementMetrics, Platform};

/// Configuration for mock publisher behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: Platform,

    /// Id returned by a successful publish
    pub external_id: String,

    /// Error returned by publish instead of an id
    pub publish_error: Option<PlatformError>,

    /// Counters returned by fetch_metrics
    pub metrics: EngagementMetrics,

    /// Error returned by fetch_metrics instead of counters
    pub metrics_error: Option<PlatformError>,

    pub has_credentials: bool,

    /// Simulated network latency
    pub delay: Duration,

    pub publish_call_count: Arc<Mutex<usize>>,
    pub metrics_call_count: Arc<Mutex<usize>>,

    /// (content, image_url) for every publish call
    pub published: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl MockConfig {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            external_id: format!("mock-{}", platform.as_str()),
            publish_error: None,
            metrics: EngagementMetrics::default(),
            metrics_error: None,
            has_credentials: true,
            delay: Duration::ZERO,
            publish_call_count: Arc::new(Mutex::new(0)),
            metrics_call_count: Arc::new(Mutex::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockPublisher {
    config: MockConfig,
}

impl MockPublisher {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// A publisher that always returns `external_id`
    pub fn success(platform: Platform, external_id: &str) -> Self {
        Self::new(MockConfig {
            external_id: external_id.to_string(),
            ..MockConfig::new(platform)
        })
    }

    /// A publisher whose every publish fails with `error`
    pub fn failure(platform: Platform, error: PlatformError) -> Self {
        Self::new(MockConfig {
            publish_error: Some(error),
            ..MockConfig::new(platform)
        })
    }

    /// A publisher reporting missing credentials
    pub fn without_credentials(platform: Platform) -> Self {
        Self::new(MockConfig {
            has_credentials: false,
            ..MockConfig::new(platform)
        })
    }

    pub fn with_metrics(mut self, metrics: EngagementMetrics) -> Self {
        self.config.metrics = metrics;
        self
    }

    pub fn with_metrics_error(mut self, error: PlatformError) -> Self {
        self.config.metrics_error = Some(error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    pub fn publish_call_count(&self) -> usize {
        self.config
            .publish_call_count
            .lock()
            .map(|count| *count)
            .unwrap_or_default()
    }

    pub fn metrics_call_count(&self) -> usize {
        self.config
            .metrics_call_count
            .lock()
            .map(|count| *count)
            .unwrap_or_default()
    }

    /// Content of every publish call, in call order
    pub fn published(&self) -> Vec<(String, Option<String>)> {
        self.config
            .published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    fn check_credentials(&self) -> bool {
        self.config.has_credentials
    }

    async fn publish(&self, content: &str, image_url: Option<&str>) -> PublishResult<String> {
        if let Ok(mut count) = self.config.publish_call_count.lock() {
            *count += 1;
        }

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if let Some(error) = &self.config.publish_error {
            return Err(error.clone());
        }

        if let Ok(mut published) = self.config.published.lock() {
            published.push((content.to_string(), image_url.map(str::to_string)));
        }

        Ok(self.config.external_id.clone())
    }

    async fn fetch_metrics(&self, _external_id: &str) -> PublishResult<EngagementMetrics> {
        if let Ok(mut count) = self.config.metrics_call_count.lock() {
            *count += 1;
        }

        match &self.config.metrics_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.config.metrics),
        }
    }
}
