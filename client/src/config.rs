//! Configuration management for the sync runtime.

use std::env;
use std::time::Duration;

/// Default poll interval for conflict checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite URL of the local durable key-value area
    pub local_db_url: String,
    /// Base URL of the remote document store
    pub remote_url: String,
    /// Document collection holding inventory records
    pub collection: String,
    /// How often open conflicts are re-read and pending changes pushed
    pub poll_interval: Duration,
    /// Re-read the server record before writing a resolution
    pub verify_before_resolve: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let local_db_url = lookup("STOCKSYNC_LOCAL_DB")
            .unwrap_or_else(|| "sqlite://stocksync.db?mode=rwc".to_string());

        let remote_url = lookup("STOCKSYNC_REMOTE_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingRemoteUrl)?;

        let collection =
            lookup("STOCKSYNC_COLLECTION").unwrap_or_else(|| "inventory".to_string());

        let poll_interval = match lookup("STOCKSYNC_POLL_INTERVAL_MS") {
            Some(raw) => {
                let millis: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidPollInterval(raw.clone()))?;
                if millis == 0 {
                    return Err(ConfigError::InvalidPollInterval(raw));
                }
                Duration::from_millis(millis)
            }
            None => DEFAULT_POLL_INTERVAL,
        };

        let verify_before_resolve = match lookup("STOCKSYNC_VERIFY_BEFORE_RESOLVE") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidFlag(raw))?,
            None => true,
        };

        Ok(Self {
            local_db_url,
            remote_url,
            collection,
            poll_interval,
            verify_before_resolve,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("STOCKSYNC_REMOTE_URL environment variable is required")]
    MissingRemoteUrl,

    #[error("Invalid STOCKSYNC_POLL_INTERVAL_MS value: {0}")]
    InvalidPollInterval(String),

    #[error("Invalid STOCKSYNC_VERIFY_BEFORE_RESOLVE value: {0}")]
    InvalidFlag(String),
}
