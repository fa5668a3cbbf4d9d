//! Platform publishers
//!
//! Each supported network is a `Publisher`. The dispatcher only ever talks to
//! this trait, so tests swap in `MockPublisher` without touching the network.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::types::{EngagementMetrics, Platform};

pub mod facebook;
pub mod http;
pub mod instagram;
pub mod mock;
pub mod x;

pub use facebook::FacebookClient;
pub use instagram::InstagramClient;
pub use mock::MockPublisher;
pub use x::XClient;

/// Outcome of a single platform call
pub type PublishResult<T> = std::result::Result<T, PlatformError>;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// The network this publisher posts to
    fn platform(&self) -> Platform;

    /// Whether every credential needed for posting is present
    ///
    /// Checked before any network call; a `false` here becomes the
    /// "credentials missing" failure on the entry.
    fn check_credentials(&self) -> bool;

    /// Publish text (and an optional image) and return the platform's id
    async fn publish(&self, content: &str, image_url: Option<&str>) -> PublishResult<String>;

    /// Read current engagement counters for a previously published item
    async fn fetch_metrics(&self, external_id: &str) -> PublishResult<EngagementMetrics>;
}

/// The set of publishers available to a dispatcher, at most one per platform
#[derive(Default)]
pub struct Publishers {
    publishers: Vec<Box<dyn Publisher>>,
}

impl Publishers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the real X, Instagram and Facebook clients from configuration
    ///
    /// All clients share one HTTP client carrying `dispatch.timeout_secs`.
    /// Missing credentials are not an error here; they surface per entry.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = http::build_client(Duration::from_secs(config.dispatch.timeout_secs))?;

        Ok(Self::new()
            .with(XClient::from_config(&config.x, http.clone()))
            .with(InstagramClient::from_config(&config.instagram, http.clone()))
            .with(FacebookClient::from_config(&config.facebook, http)))
    }

    /// Add a publisher, replacing any existing one for the same platform
    pub fn with(mut self, publisher: impl Publisher + 'static) -> Self {
        self.insert(Box::new(publisher));
        self
    }

    pub fn insert(&mut self, publisher: Box<dyn Publisher>) {
        let platform = publisher.platform();
        self.publishers.retain(|p| p.platform() != platform);
        self.publishers.push(publisher);
    }

    pub fn get(&self, platform: Platform) -> Option<&dyn Publisher> {
        self.publishers
            .iter()
            .find(|p| p.platform() == platform)
            .map(|p| p.as_ref())
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.publishers.iter().map(|p| p.platform()).collect()
    }
}

/// Wrap a configured, non-blank value as a secret
pub(crate) fn secret(value: &Option<String>) -> Option<secrecy::SecretString> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| secrecy::SecretString::from(v.to_string()))
}

/// A configured, non-blank plain value
pub(crate) fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
