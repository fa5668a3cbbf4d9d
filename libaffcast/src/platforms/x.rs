//! X (Twitter) API v2 publisher
//!
//! Posting uses an OAuth 2.0 user access token with `tweet.write` scope.
//! Metrics are read from `public_metrics` with the app bearer token, falling
//! back to the user token when no bearer token is configured.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::XConfig;
use crate::error::PlatformError;
use crate::platforms::http::{read_json, send_error};
use crate::platforms::{non_blank, secret, PublishResult, Publisher};
use crate::types::{EngagementMetrics, Platform};

pub const DEFAULT_API_BASE: &str = "https://api.x.com";

#[derive(Serialize)]
struct CreateTweetRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct TweetEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct CreatedTweet {
    id: String,
}

#[derive(Deserialize)]
struct TweetWithMetrics {
    public_metrics: PublicMetrics,
}

#[derive(Debug, Deserialize)]
struct PublicMetrics {
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    retweet_count: i64,
    #[serde(default)]
    quote_count: i64,
    #[serde(default)]
    reply_count: i64,
    /// Only returned on paid tiers
    #[serde(default)]
    impression_count: i64,
}

impl From<PublicMetrics> for EngagementMetrics {
    fn from(m: PublicMetrics) -> Self {
        EngagementMetrics {
            likes: m.like_count,
            reposts: m.retweet_count + m.quote_count,
            comments: m.reply_count,
            impressions: m.impression_count,
        }
    }
}

pub struct XClient {
    http: Client,
    access_token: Option<SecretString>,
    bearer_token: Option<SecretString>,
    api_base: String,
}

impl XClient {
    pub fn from_config(config: &XConfig, http: Client) -> Self {
        Self {
            http,
            access_token: secret(&config.access_token),
            bearer_token: secret(&config.bearer_token),
            api_base: non_blank(&config.api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn user_token(&self) -> PublishResult<&str> {
        self.access_token
            .as_ref()
            .map(|t| t.expose_secret())
            .ok_or_else(|| PlatformError::Authentication("X access token not configured".to_string()))
    }

    fn read_token(&self) -> PublishResult<&str> {
        match &self.bearer_token {
            Some(token) => Ok(token.expose_secret()),
            None => self.user_token(),
        }
    }
}

#[async_trait]
impl Publisher for XClient {
    fn platform(&self) -> Platform {
        Platform::X
    }

    fn check_credentials(&self) -> bool {
        self.access_token.is_some()
    }

    async fn publish(&self, content: &str, image_url: Option<&str>) -> PublishResult<String> {
        if image_url.is_some() {
            tracing::debug!("X posts are text-only; ignoring image_url");
        }

        let resp = self
            .http
            .post(format!("{}/2/tweets", self.api_base))
            .bearer_auth(self.user_token()?)
            .json(&CreateTweetRequest { text: content })
            .send()
            .await
            .map_err(send_error)?;

        let envelope: TweetEnvelope<CreatedTweet> = parse(read_json(resp).await?)?;
        tracing::debug!(tweet_id = %envelope.data.id, "Tweet created");
        Ok(envelope.data.id)
    }

    async fn fetch_metrics(&self, external_id: &str) -> PublishResult<EngagementMetrics> {
        let resp = self
            .http
            .get(format!("{}/2/tweets/{}", self.api_base, external_id))
            .query(&[("tweet.fields", "public_metrics")])
            .bearer_auth(self.read_token()?)
            .send()
            .await
            .map_err(send_error)?;

        let envelope: TweetEnvelope<TweetWithMetrics> = parse(read_json(resp).await?)
            .map_err(|_| PlatformError::Posting(format!("no data returned for tweet {}", external_id)))?;
        Ok(envelope.data.public_metrics.into())
    }
}

fn parse<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> PublishResult<T> {
    serde_json::from_value(value)
        .map_err(|e| PlatformError::Posting(format!("unexpected X response: {}", e)))
}
