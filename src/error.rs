//! Error types for the intent tracker

use thiserror::Error;

/// Errors that can occur while tracking a visitor
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{endpoint} responded with status {status}")]
    StatusError { endpoint: String, status: u16 },

    #[error("Invalid visitor profile: {0}")]
    InvalidProfile(String),

    #[error("Invalid tracking event: {0}")]
    InvalidEvent(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl TrackerError {
    /// Whether this error is a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TrackerError::Cancelled)
    }
}
