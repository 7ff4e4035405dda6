//! Configuration from environment variables
//!
//! Required variables name the three API keys, the two downstream URLs, and
//! the listen port; a missing one fails startup (the process exits
//! non-zero). The rest have defaults and exist mostly so tests can point the
//! service at local stand-ins.

use std::path::PathBuf;

use common::{ApiKey, Error, Result};

/// Default host for the account-service API endpoints.
const DEFAULT_STEAM_API_URL: &str = "https://api.steampowered.com";
/// Default host for the community inventory endpoint.
const DEFAULT_STEAM_COMMUNITY_URL: &str = "https://steamcommunity.com";

/// Runtime configuration.
#[derive(Debug)]
pub struct Config {
    /// HTTP listen port (`PORT`).
    pub port: u16,
    /// Directory holding the queue and pool files (`DATA_DIR`, default `./data`).
    pub data_dir: PathBuf,
    /// Account-service key, sent on `steam_level` and `friends` (`STEAM_API_KEY`).
    pub steam_api_key: ApiKey,
    /// Downstream write key (`PUBLISH_API_KEY`).
    pub publish_api_key: ApiKey,
    /// Shared ingress/admin key (`INGRESS_API_KEY`).
    pub ingress_api_key: ApiKey,
    /// Downstream write endpoint (`PUBLISH_URL`).
    pub publish_url: String,
    /// Existence-check URL prefix (`EXISTENCE_CHECK_URL`).
    pub existence_check_url: String,
    /// Account-service host (`STEAM_API_URL`, optional).
    pub steam_api_url: String,
    /// Community host (`STEAM_COMMUNITY_URL`, optional).
    pub steam_community_url: String,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through a variable lookup (injectable for tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| -> Result<String> {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Config(format!("{name} must be set")))
        };

        let port = required("PORT")?
            .parse::<u16>()
            .map_err(|e| Error::Config(format!("PORT: {e}")))?;

        Ok(Self {
            port,
            data_dir: lookup("DATA_DIR").unwrap_or_else(|| "./data".into()).into(),
            steam_api_key: ApiKey::new(required("STEAM_API_KEY")?),
            publish_api_key: ApiKey::new(required("PUBLISH_API_KEY")?),
            ingress_api_key: ApiKey::new(required("INGRESS_API_KEY")?),
            publish_url: required("PUBLISH_URL")?,
            existence_check_url: required("EXISTENCE_CHECK_URL")?,
            steam_api_url: lookup("STEAM_API_URL")
                .unwrap_or_else(|| DEFAULT_STEAM_API_URL.into()),
            steam_community_url: lookup("STEAM_COMMUNITY_URL")
                .unwrap_or_else(|| DEFAULT_STEAM_COMMUNITY_URL.into()),
        })
    }

    /// Path of the queue file.
    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join("profiles_queue.json")
    }

    /// Path of the pool config file.
    pub fn pool_path(&self) -> PathBuf {
        self.data_dir.join("config_proxies.json")
    }
}
