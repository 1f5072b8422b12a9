use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Article-Sync
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    pub sitemap: SitemapConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub parser: ParserConfig,
}

/// Sync pass behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Maximum number of article fetches in flight at once
    #[serde(rename = "max-concurrent-fetches", default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: u32,

    /// Timeout applied to every individual request (milliseconds)
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Attempts per article before giving up on transient errors (0 = never give up)
    #[serde(rename = "max-fetch-attempts", default = "default_max_fetch_attempts")]
    pub max_fetch_attempts: u32,

    /// Pause between transient-failure retries (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Seconds between passes in watch mode
    #[serde(rename = "interval-secs", default)]
    pub interval_secs: Option<u64>,
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Attempt ceiling, or `None` when retries are unbounded
    pub fn attempt_limit(&self) -> Option<u32> {
        (self.max_fetch_attempts > 0).then_some(self.max_fetch_attempts)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            request_timeout_ms: default_request_timeout_ms(),
            max_fetch_attempts: default_max_fetch_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            interval_secs: None,
        }
    }
}

fn default_max_concurrent_fetches() -> u32 {
    8
}

fn default_request_timeout_ms() -> u64 {
    7_000
}

fn default_max_fetch_attempts() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    250
}

/// Locations of the two sitemaps driving discovery
#[derive(Debug, Clone, Deserialize)]
pub struct SitemapConfig {
    /// Sitemap listing article URLs and their last-modified timestamps
    #[serde(rename = "article-sitemap-url")]
    pub article_sitemap_url: String,

    /// Image sitemap cross-referencing article URLs to image metadata
    #[serde(rename = "image-sitemap-url")]
    pub image_sitemap_url: String,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// CSS selectors used to pull article fields out of a fetched page
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Paragraphs making up the article body
    pub body: String,
    pub categories: String,
    pub tags: String,
    /// Element whose text is the author name
    pub author: String,
    /// Element carrying the publish time in its `datetime` attribute
    pub published: String,
    pub title: String,
    /// One element per comment
    pub comments: String,
    #[serde(rename = "comment-time")]
    pub comment_time: String,
    #[serde(rename = "comment-author")]
    pub comment_author: String,
    #[serde(rename = "comment-text")]
    pub comment_text: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            body: "main article p".to_string(),
            categories: "footer span.cat-links a".to_string(),
            tags: "footer span.tags-links a".to_string(),
            author: "span.author a".to_string(),
            published: "time.published".to_string(),
            title: "h2.entry-title".to_string(),
            comments: "ol.comment-list > li".to_string(),
            comment_time: "time".to_string(),
            comment_author: "b".to_string(),
            comment_text: "div.comment-content".to_string(),
        }
    }
}
