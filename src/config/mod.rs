//! Configuration module for Article-Sync
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use article_sync::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sync.toml")).unwrap();
//! println!("Fetch concurrency: {}", config.sync.max_concurrent_fetches);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, OutputConfig, ParserConfig, SitemapConfig, SyncConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};

pub(crate) use validation::compile_selector;
