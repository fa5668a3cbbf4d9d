//! Instagram Graph API publisher
//!
//! Feed posts need an image: a media container is created from `image_url`
//! and then published. Text-only posts go through the Threads endpoints of
//! the same account; when those are unavailable the post is rejected with a
//! validation error asking for an image.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::InstagramConfig;
use crate::error::PlatformError;
use crate::platforms::http::{read_json, require_str, send_error};
use crate::platforms::{non_blank, secret, PublishResult, Publisher};
use crate::types::{EngagementMetrics, Platform};

pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v21.0";

/// Time given to Instagram to process a container before publishing it
const DEFAULT_CONTAINER_WAIT: Duration = Duration::from_secs(3);

const INSIGHT_METRICS: &str = "impressions,reach,likes,comments,shares,saved";

pub struct InstagramClient {
    http: Client,
    user_id: Option<String>,
    access_token: Option<SecretString>,
    api_base: String,
    container_wait: Duration,
}

impl InstagramClient {
    pub fn from_config(config: &InstagramConfig, http: Client) -> Self {
        Self {
            http,
            user_id: non_blank(&config.user_id),
            access_token: secret(&config.access_token),
            api_base: non_blank(&config.api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            container_wait: DEFAULT_CONTAINER_WAIT,
        }
    }

    pub fn with_container_wait(mut self, wait: Duration) -> Self {
        self.container_wait = wait;
        self
    }

    fn credentials(&self) -> PublishResult<(&str, &str)> {
        match (&self.user_id, &self.access_token) {
            (Some(uid), Some(token)) => Ok((uid.as_str(), token.expose_secret())),
            _ => Err(PlatformError::Authentication(
                "Instagram user id or access token not configured".to_string(),
            )),
        }
    }

    async fn post_params(&self, path: &str, params: &[(&str, &str)]) -> PublishResult<Value> {
        let resp = self
            .http
            .post(format!("{}/{}", self.api_base, path))
            .query(params)
            .send()
            .await
            .map_err(send_error)?;

        read_json(resp).await
    }

    /// Create a container and publish it, returning the media id
    async fn create_and_publish(
        &self,
        uid: &str,
        token: &str,
        kind: &str,
        params: &[(&str, &str)],
    ) -> PublishResult<String> {
        let mut create = params.to_vec();
        create.push(("access_token", token));

        let container = self
            .post_params(&format!("{}/{}", uid, kind), &create)
            .await?;
        let container_id = require_str(&container, "/id")?;
        tracing::debug!(container_id = %container_id, kind, "Instagram container created");

        if !self.container_wait.is_zero() {
            tokio::time::sleep(self.container_wait).await;
        }

        let published = self
            .post_params(
                &format!("{}/{}_publish", uid, kind),
                &[("creation_id", container_id.as_str()), ("access_token", token)],
            )
            .await?;

        require_str(&published, "/id")
    }
}

#[async_trait]
impl Publisher for InstagramClient {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn check_credentials(&self) -> bool {
        self.user_id.is_some() && self.access_token.is_some()
    }

    async fn publish(&self, content: &str, image_url: Option<&str>) -> PublishResult<String> {
        let (uid, token) = self.credentials()?;

        match image_url {
            Some(url) => {
                self.create_and_publish(uid, token, "media", &[("image_url", url), ("caption", content)])
                    .await
            }
            None => self
                .create_and_publish(uid, token, "threads", &[("media_type", "TEXT"), ("text", content)])
                .await
                .map_err(|e| match e {
                    // The account has no Threads access
                    PlatformError::Validation(_) | PlatformError::Posting(_) => {
                        PlatformError::Validation(
                            "text-only Instagram posts are not supported; set an image_url on the post"
                                .to_string(),
                        )
                    }
                    other => other,
                }),
        }
    }

    async fn fetch_metrics(&self, external_id: &str) -> PublishResult<EngagementMetrics> {
        let (_, token) = self.credentials()?;

        let resp = self
            .http
            .get(format!("{}/{}/insights", self.api_base, external_id))
            .query(&[("metric", INSIGHT_METRICS), ("access_token", token)])
            .send()
            .await
            .map_err(send_error)?;

        Ok(insights_to_metrics(&read_json(resp).await?))
    }
}

/// Map an insights response (`data[].name`, `data[].values[0].value`)
fn insights_to_metrics(value: &Value) -> EngagementMetrics {
    let by_name: HashMap<&str, i64> = value
        .get("data")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let name = item.get("name")?.as_str()?;
                    let v = item.pointer("/values/0/value")?.as_i64()?;
                    Some((name, v))
                })
                .collect()
        })
        .unwrap_or_default();

    let get = |name: &str| by_name.get(name).copied().unwrap_or(0);

    EngagementMetrics {
        likes: get("likes"),
        reposts: get("shares"),
        comments: get("comments"),
        impressions: get("impressions"),
    }
}
