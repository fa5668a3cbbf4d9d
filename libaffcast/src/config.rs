//! Configuration management for Affcast
//!
//! Settings come from a TOML file (optional) and are then overridden by
//! environment variables, so a cron job with only API keys in its
//! environment works without any file at all.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

pub const DEFAULT_DB_PATH: &str = "~/.local/share/affcast/affcast.db";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub x: XConfig,
    #[serde(default)]
    pub instagram: InstagramConfig,
    #[serde(default)]
    pub facebook: FacebookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Per-request timeout for every platform call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Seconds between cycles in loop mode
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            poll_interval: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

/// X API v2 credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XConfig {
    /// OAuth 2.0 user access token (tweet.write scope), used for posting
    pub access_token: Option<String>,
    /// App bearer token, used for reading metrics
    pub bearer_token: Option<String>,
    /// Override for the API base URL
    pub api_base: Option<String>,
}

/// Instagram Graph API credentials (Business/Creator account)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstagramConfig {
    pub user_id: Option<String>,
    pub access_token: Option<String>,
    pub api_base: Option<String>,
}

/// Facebook page credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacebookConfig {
    pub page_id: Option<String>,
    pub page_access_token: Option<String>,
    pub api_base: Option<String>,
}

impl Config {
    /// Load configuration from the default location, then apply the environment
    ///
    /// A missing file at the default location falls back to built-in
    /// defaults. A path named explicitly through `AFFCAST_CONFIG` must exist.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var("AFFCAST_CONFIG").is_ok();
        let config_path = resolve_config_path()?;

        let mut config = if explicit || config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            Self::default_config()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Apply environment overrides through a lookup function
    ///
    /// Empty values are ignored so that an exported-but-blank variable does
    /// not wipe a token from the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("AFFCAST_DB_PATH") {
            self.database.path = path;
        }

        if let Some(v) = get("X_ACCESS_TOKEN") {
            self.x.access_token = Some(v);
        }
        if let Some(v) = get("X_BEARER_TOKEN") {
            self.x.bearer_token = Some(v);
        }

        if let Some(v) = get("IG_USER_ID") {
            self.instagram.user_id = Some(v);
        }
        if let Some(v) = get("IG_ACCESS_TOKEN") {
            self.instagram.access_token = Some(v);
        }

        if let Some(v) = get("FB_PAGE_ID") {
            self.facebook.page_id = Some(v);
        }
        if let Some(v) = get("FB_PAGE_ACCESS_TOKEN") {
            self.facebook.page_access_token = Some(v);
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("AFFCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("affcast").join("config.toml"))
}
