//! Tracker configuration
//!
//! A single base URL for the remote scoring service plus the timing policy of
//! the pipeline. Every field has a default, so an empty TOML document or an
//! unset environment yields a working configuration.

use crate::error::TrackerError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fallback remote service used when no base URL is configured
pub const DEFAULT_API_URL: &str = "https://intent-agent-backend.onrender.com";

/// Environment variable overriding the remote service base URL
pub const API_URL_ENV: &str = "INTENT_TRACKER_API_URL";

/// Configuration for a [`crate::VisitorTracker`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Base URL of the remote scoring service
    pub api_base_url: String,
    /// Upper bound on a single scoring request
    pub request_timeout_ms: u64,
    /// Debounce window coalescing queued events into one batch
    pub flush_debounce_ms: u64,
    /// Shortest natural delay before a proactive message appears
    pub display_delay_min_ms: u64,
    /// Longest natural delay before a proactive message appears
    pub display_delay_max_ms: u64,
    /// Auto-dismiss timeout for low intent messages
    pub auto_dismiss_low_ms: u64,
    /// Auto-dismiss timeout for medium intent messages
    pub auto_dismiss_medium_ms: u64,
    /// Delay before the first visit marks the visitor as returning
    pub return_visitor_flag_delay_ms: u64,
    /// Page-exit deliveries below this time on page are skipped
    pub unload_noise_floor_ms: u64,
    /// Delay before an anonymous visitor is asked to identify
    pub form_prompt_delay_ms: u64,
    /// Also batch page views to `/api/track-behavior`
    pub batched_events: bool,
    /// File backing the durable storage scope
    pub storage_path: Option<PathBuf>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_ms: 10_000,
            flush_debounce_ms: 2_000,
            display_delay_min_ms: 5_000,
            display_delay_max_ms: 7_000,
            auto_dismiss_low_ms: 8_000,
            auto_dismiss_medium_ms: 15_000,
            return_visitor_flag_delay_ms: 5_000,
            unload_noise_floor_ms: 2_000,
            form_prompt_delay_ms: 5_000,
            batched_events: false,
            storage_path: None,
        }
    }
}

impl TrackerConfig {
    /// Defaults, with the base URL taken from the environment when set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, TrackerError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| TrackerError::ConfigError(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self, TrackerError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            TrackerError::ConfigError(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
    }

    /// Check the configuration for values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), TrackerError> {
        let url = url::Url::parse(&self.api_base_url).map_err(|e| {
            TrackerError::ConfigError(format!("invalid api_base_url {}: {e}", self.api_base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TrackerError::ConfigError(format!(
                "api_base_url must be http(s), got {}",
                url.scheme()
            )));
        }
        if self.display_delay_min_ms > self.display_delay_max_ms {
            return Err(TrackerError::ConfigError(
                "display_delay_min_ms must not exceed display_delay_max_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Join an API path onto the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn flush_debounce(&self) -> Duration {
        Duration::from_millis(self.flush_debounce_ms)
    }

    pub fn return_visitor_flag_delay(&self) -> Duration {
        Duration::from_millis(self.return_visitor_flag_delay_ms)
    }

    pub fn unload_noise_floor(&self) -> Duration {
        Duration::from_millis(self.unload_noise_floor_ms)
    }

    pub fn form_prompt_delay(&self) -> Duration {
        Duration::from_millis(self.form_prompt_delay_ms)
    }
}
