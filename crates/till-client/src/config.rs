//! # Client Configuration
//!
//! Configuration for the register client.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILL_API_URL=https://erp.example.com/api                           │
//! │     TILL_MAX_RETRIES=3                                                 │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/erp/client.toml (Linux)                                  │
//! │     ~/Library/Application Support/com.till.erp/client.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     http://localhost:3000/api, 2 retries, 500ms backoff base           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # client.toml
//! [api]
//! base_url = "https://erp.example.com/api"
//! timeout_secs = 15
//! auth_token = "..."
//!
//! [retry]
//! max_retries = 2
//! backoff_base_ms = 500
//!
//! [cache]
//! refresh_after_submit = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::retry::RetryPolicy;

// =============================================================================
// API Settings
// =============================================================================

/// Where the ERP backend lives and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL every endpoint path is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Bearer token sent with every request, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_timeout() -> u64 {
    15
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            auth_token: None,
        }
    }
}

impl ApiSettings {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Retry behavior for idempotent calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt. 0 disables retrying.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Linear backoff step (milliseconds). Wait before retry `n` is
    /// `backoff_base_ms * n`.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base() -> u64 {
    500
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base(),
        }
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// Register cache behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Re-fetch the whole history after a successful submission instead of
    /// applying the new movement incrementally.
    #[serde(default)]
    pub refresh_after_submit: bool,
}

// =============================================================================
// Main Client Configuration
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub cache: CacheSettings,
}

impl ClientConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (client.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ClientResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading client config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load client config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ClientResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ClientError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ClientError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| ClientError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Client config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ClientResult<()> {
        let url = Url::parse(&self.api.base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(ClientError::InvalidConfig(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.retry.max_retries > 0 && self.retry.backoff_base_ms == 0 {
            return Err(ClientError::InvalidConfig(
                "backoff_base_ms must be greater than 0 when retries are enabled".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("TILL_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Ok(token) = std::env::var("TILL_API_TOKEN") {
            self.api.auth_token = Some(token).filter(|t| !t.is_empty());
        }

        if let Ok(timeout) = std::env::var("TILL_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.api.timeout_secs = secs,
                Err(_) => warn!(value = %timeout, "Ignoring invalid TILL_TIMEOUT_SECS"),
            }
        }

        if let Ok(retries) = std::env::var("TILL_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(n) => {
                    debug!(max_retries = n, "Overriding max retries from environment");
                    self.retry.max_retries = n;
                }
                Err(_) => warn!(value = %retries, "Ignoring invalid TILL_MAX_RETRIES"),
            }
        }

        if let Ok(base) = std::env::var("TILL_BACKOFF_BASE_MS") {
            match base.parse::<u64>() {
                Ok(ms) => self.retry.backoff_base_ms = ms,
                Err(_) => warn!(value = %base, "Ignoring invalid TILL_BACKOFF_BASE_MS"),
            }
        }

        if let Ok(flag) = std::env::var("TILL_REFRESH_AFTER_SUBMIT") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.cache.refresh_after_submit = true,
                "0" | "false" | "no" => self.cache.refresh_after_submit = false,
                _ => warn!(value = %flag, "Unknown TILL_REFRESH_AFTER_SUBMIT value"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "till", "erp")
            .map(|dirs| dirs.config_dir().join("client.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Retry policy built from the `[retry]` section.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_millis(self.retry.backoff_base_ms),
        )
    }

    /// Returns the API base URL.
    pub fn base_url(&self) -> &str {
        &self.api.base_url
    }
}
