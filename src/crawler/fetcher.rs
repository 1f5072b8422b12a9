//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the synchronizer, including:
//! - Building HTTP clients with proper user agent strings
//! - Bounding every request by its own timeout
//! - Classifying failures as transient or fatal

use crate::config::UserAgentConfig;
use reqwest::{redirect::Policy, Client};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Outcome of a failed fetch
///
/// Only [`FetchError::Fatal`] is permanent. Everything else is worth retrying.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("HTTP status {status}")]
    Fatal { status: u16 },
}

impl FetchError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// Something that can turn a URL into a response body
///
/// Implementations own their timeout: a call that resolves at all must have
/// done so within the configured bound.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

impl<F: Fetch> Fetch for Arc<F> {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send {
        (**self).fetch(url)
    }
}

/// Fetcher backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn get(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::Fatal {
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(classify_reqwest_error)
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        match tokio::time::timeout(self.timeout, self.get(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Transient("request timeout".to_string())
    } else if e.is_connect() {
        FetchError::Transient(format!("connection failed: {}", e))
    } else {
        FetchError::Transient(e.to_string())
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use article_sync::config::UserAgentConfig;
/// use article_sync::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "ArticleSync".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}
