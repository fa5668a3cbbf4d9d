//! Facebook page publisher
//!
//! Text goes to `/{page_id}/feed`, images to `/{page_id}/photos`. The page
//! access token needs `pages_manage_posts` and `pages_read_engagement`.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::config::FacebookConfig;
use crate::error::PlatformError;
use crate::platforms::http::{read_json, require_str, send_error};
use crate::platforms::{non_blank, secret, PublishResult, Publisher};
use crate::types::{EngagementMetrics, Platform};

pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v21.0";

const ENGAGEMENT_FIELDS: &str = "likes.summary(true),comments.summary(true),shares";

pub struct FacebookClient {
    http: Client,
    page_id: Option<String>,
    page_access_token: Option<SecretString>,
    api_base: String,
}

impl FacebookClient {
    pub fn from_config(config: &FacebookConfig, http: Client) -> Self {
        Self {
            http,
            page_id: non_blank(&config.page_id),
            page_access_token: secret(&config.page_access_token),
            api_base: non_blank(&config.api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn token(&self) -> PublishResult<&str> {
        self.page_access_token
            .as_ref()
            .map(|t| t.expose_secret())
            .ok_or_else(|| {
                PlatformError::Authentication("Facebook page access token not configured".to_string())
            })
    }
}

#[async_trait]
impl Publisher for FacebookClient {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn check_credentials(&self) -> bool {
        self.page_id.is_some() && self.page_access_token.is_some()
    }

    async fn publish(&self, content: &str, image_url: Option<&str>) -> PublishResult<String> {
        let token = self.token()?;
        let page_id = self
            .page_id
            .as_deref()
            .ok_or_else(|| PlatformError::Authentication("Facebook page id not configured".to_string()))?;

        let request = match image_url {
            Some(url) => self
                .http
                .post(format!("{}/{}/photos", self.api_base, page_id))
                .form(&[("url", url), ("caption", content), ("access_token", token)]),
            None => self
                .http
                .post(format!("{}/{}/feed", self.api_base, page_id))
                .form(&[("message", content), ("access_token", token)]),
        };

        let resp = request.send().await.map_err(send_error)?;
        post_id_from_response(&read_json(resp).await?)
    }

    async fn fetch_metrics(&self, external_id: &str) -> PublishResult<EngagementMetrics> {
        let resp = self
            .http
            .get(format!("{}/{}", self.api_base, external_id))
            .query(&[("fields", ENGAGEMENT_FIELDS), ("access_token", self.token()?)])
            .send()
            .await
            .map_err(send_error)?;

        Ok(engagement_to_metrics(&read_json(resp).await?))
    }
}

/// `/photos` answers `{"id": <photo>, "post_id": <feed post>}`; `/feed` only `{"id"}`
fn post_id_from_response(value: &Value) -> PublishResult<String> {
    require_str(value, "/post_id").or_else(|_| require_str(value, "/id"))
}

/// Page reach lives behind the separate insights endpoint, so impressions stay 0
fn engagement_to_metrics(value: &Value) -> EngagementMetrics {
    let count = |pointer: &str| value.pointer(pointer).and_then(Value::as_i64).unwrap_or(0);

    EngagementMetrics {
        likes: count("/likes/summary/total_count"),
        reposts: count("/shares/count"),
        comments: count("/comments/summary/total_count"),
        impressions: 0,
    }
}
