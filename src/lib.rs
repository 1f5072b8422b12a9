//! Article-Sync: incremental sitemap-driven article synchronizer
//!
//! This crate discovers articles through a site's content and image sitemaps,
//! compares them against a SQLite store, and re-fetches only the articles whose
//! last-modified timestamp changed since the previous pass.

pub mod config;
pub mod crawler;
pub mod output;
pub mod sitemap;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Article-Sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Discovery failed: {0}")]
    Discovery(#[from] sitemap::DiscoveryError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::TaskState,
        to: state::TaskState,
    },

    #[error("Pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
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

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector for {field}: {message}")]
    InvalidSelector { field: &'static str, message: String },
}

/// Result type alias for Article-Sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_sync, SyncReport};
pub use sitemap::{DiscoveryEntry, ImageMeta};
pub use state::TaskState;
