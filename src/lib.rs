//! Bili-Harvest: a personal bilibili archiver
//!
//! This crate implements a crawler/downloader for bilibili: it enumerates a
//! user's videos, collections (both the legacy "series" and the newer
//! "season" grouping schemes), and moments ("dynamics") with their nested
//! comments, then downloads video media (muxed from separate DASH tracks by
//! an external ffmpeg process) and persists moments and comments as JSON.

pub mod api;
pub mod config;
pub mod crawler;
pub mod credential;
pub mod media;
pub mod output;

use thiserror::Error;

/// Main error type for Bili-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    #[error("Request rate-limited (412)")]
    RateLimited,

    #[error("Credential expired (-352)")]
    CredentialExpired,

    #[error("Credential refresh is not possible without a refresh token")]
    RefreshUnavailable,

    #[error("Credential refresh failed: {0}")]
    RefreshFailed(String),

    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Malformed response from {endpoint}")]
    MalformedResponse { endpoint: &'static str },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not detect the type of collection {collection_id}")]
    DetectFailed { collection_id: u64 },

    #[error("Muxer exited with status {code:?}")]
    MuxFailed { code: Option<i32> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true if this error should trigger exponential backoff.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Returns true if this error should trigger a credential refresh.
    pub fn is_credential_expired(&self) -> bool {
        matches!(self, Self::CredentialExpired)
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for Bili-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use api::{BiliClient, RetryPolicy};
pub use config::Config;
pub use crawler::Coordinator;
pub use credential::{Credential, CredentialStore};
