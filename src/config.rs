//! Configuration and settings management
//!
//! Loads settings from environment variables and defines sweep/retry constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// R2 Storage access key ID
    pub r2_access_key_id: Option<String>,
    /// R2 Storage secret access key
    pub r2_secret_access_key: Option<String>,
    /// R2 Storage endpoint URL
    pub r2_endpoint_url: Option<String>,
    /// R2 Storage bucket name
    pub r2_bucket_name: Option<String>,

    /// Seconds between sweep cycles
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// TTL for cached admin-status lookups
    #[serde(default = "default_admin_cache_ttl_secs")]
    pub admin_cache_ttl_secs: u64,

    /// TTL for pending custom-time prompts awaiting a reply
    #[serde(default = "default_pending_action_ttl_secs")]
    pub pending_action_ttl_secs: u64,
}

const fn default_sweep_interval_secs() -> u64 {
    10
}

const fn default_admin_cache_ttl_secs() -> u64 {
    300
}

const fn default_pending_action_ttl_secs() -> u64 {
    600
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked into git
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of APP)
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Also add settings from environment variables directly (without prefix)
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Fallback: check environment variables directly if config didn't pick them up
        if settings.r2_endpoint_url.is_none() {
            if let Ok(val) = std::env::var("R2_ENDPOINT_URL") {
                if !val.is_empty() {
                    settings.r2_endpoint_url = Some(val);
                }
            }
        }
        if settings.r2_access_key_id.is_none() {
            if let Ok(val) = std::env::var("R2_ACCESS_KEY_ID") {
                if !val.is_empty() {
                    settings.r2_access_key_id = Some(val);
                }
            }
        }
        if settings.r2_secret_access_key.is_none() {
            if let Ok(val) = std::env::var("R2_SECRET_ACCESS_KEY") {
                if !val.is_empty() {
                    settings.r2_secret_access_key = Some(val);
                }
            }
        }
        if settings.r2_bucket_name.is_none() {
            if let Ok(val) = std::env::var("R2_BUCKET_NAME") {
                if !val.is_empty() {
                    settings.r2_bucket_name = Some(val);
                }
            }
        }

        Ok(settings)
    }
}

/// Maximum number of message ids per `deleteMessages` call (Bot API limit)
pub const DELETE_BATCH_SIZE: usize = 100;

/// Maximum retry attempts for a Telegram API operation
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff delay for Telegram API retries, in milliseconds
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 250;
/// Maximum backoff delay for Telegram API retries, in milliseconds
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 5_000;

/// Maximum number of entries in the admin-status cache
pub const ADMIN_CACHE_MAX_CAPACITY: u64 = 10_000;
/// Maximum number of pending custom-time prompts tracked at once
pub const PENDING_ACTION_MAX_CAPACITY: u64 = 10_000;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Single test to avoid environment variable race conditions between cases
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        // 1. Standard loading with defaults
        env::set_var("TELEGRAM_TOKEN", "dummy_token");
        env::set_var("R2_ENDPOINT_URL", "https://example.com");

        let settings = Settings::new()?;
        assert_eq!(settings.telegram_token, "dummy_token");
        assert_eq!(
            settings.r2_endpoint_url,
            Some("https://example.com".to_string())
        );
        assert_eq!(settings.sweep_interval_secs, 10);
        assert_eq!(settings.admin_cache_ttl_secs, 300);
        assert_eq!(settings.pending_action_ttl_secs, 600);

        env::remove_var("R2_ENDPOINT_URL");

        // 2. Empty env var treated as unset
        env::set_var("R2_ENDPOINT_URL", "");
        let settings = Settings::new()?;
        assert_eq!(settings.r2_endpoint_url, None);
        env::remove_var("R2_ENDPOINT_URL");

        // 3. Tunable override
        env::set_var("SWEEP_INTERVAL_SECS", "3");
        let settings = Settings::new()?;
        assert_eq!(settings.sweep_interval_secs, 3);
        env::remove_var("SWEEP_INTERVAL_SECS");

        env::remove_var("TELEGRAM_TOKEN");
        Ok(())
    }
}
