//! Sitemap discovery
//!
//! Fetches the content sitemap and the image sitemap side by side and turns
//! them into rank-ordered [`DiscoveryEntry`] values. Discovery is all or
//! nothing: any fetch, XML or timestamp error aborts the pass.

mod parser;

use crate::config::SitemapConfig;
use crate::crawler::{Fetch, FetchError};
use chrono::{DateTime, Utc};
use parser::{parse_url_blocks, UrlBlock};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors that abort a discovery pass
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to fetch sitemap {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Malformed sitemap {url}: {message}")]
    Xml { url: String, message: String },

    #[error("Invalid timestamp {value:?} in sitemap {url}")]
    Timestamp { url: String, value: String },
}

/// One article as listed by the content sitemap, plus its images
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryEntry {
    pub url: String,
    /// 1-based position among the usable `<url>` elements
    pub rank: u32,
    pub last_modified: DateTime<Utc>,
    pub images: Vec<ImageMeta>,
}

/// Image metadata taken from the image sitemap
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMeta {
    pub url: String,
    pub title: String,
    pub caption: String,
    pub last_modified: DateTime<Utc>,
}

/// Discovery source backed by a pair of sitemaps
pub struct SitemapSource<F> {
    fetcher: F,
    article_sitemap_url: String,
    image_sitemap_url: String,
}

impl<F: Fetch> SitemapSource<F> {
    pub fn new(fetcher: F, config: &SitemapConfig) -> Self {
        Self {
            fetcher,
            article_sitemap_url: config.article_sitemap_url.clone(),
            image_sitemap_url: config.image_sitemap_url.clone(),
        }
    }

    /// Runs one discovery pass
    ///
    /// Both sitemaps are requested concurrently. The first failure wins and
    /// the other request is dropped.
    pub async fn discover(&self) -> Result<Vec<DiscoveryEntry>, DiscoveryError> {
        let (articles, images) = tokio::try_join!(
            self.fetch_manifest(&self.article_sitemap_url),
            self.fetch_manifest(&self.image_sitemap_url),
        )?;

        let entries = correlate(
            &self.article_sitemap_url,
            articles,
            &self.image_sitemap_url,
            images,
        )?;

        tracing::info!(
            entries = entries.len(),
            images = entries.iter().map(|e| e.images.len()).sum::<usize>(),
            "Discovery complete"
        );

        Ok(entries)
    }

    async fn fetch_manifest(&self, url: &str) -> Result<Vec<UrlBlock>, DiscoveryError> {
        tracing::debug!(url, "Fetching sitemap");

        let body = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|source| DiscoveryError::Fetch {
                url: url.to_string(),
                source,
            })?;

        parse_url_blocks(url, &body)
    }
}

/// Joins content blocks with image blocks by article URL
///
/// A URL listed more than once keeps only its first occurrence, so every
/// URL appears at most once per pass.
fn correlate(
    article_sitemap_url: &str,
    articles: Vec<UrlBlock>,
    image_sitemap_url: &str,
    images: Vec<UrlBlock>,
) -> Result<Vec<DiscoveryEntry>, DiscoveryError> {
    let mut images_by_article: HashMap<String, Vec<UrlBlock>> = HashMap::new();
    for block in images {
        if let Some(loc) = block.loc.clone() {
            images_by_article.entry(loc).or_default().push(block);
        }
    }

    let mut entries = Vec::with_capacity(articles.len());
    let mut seen = HashSet::new();

    for block in articles {
        let (Some(url), Some(lastmod)) = (block.loc, block.lastmod) else {
            tracing::debug!("Skipping sitemap entry without loc or lastmod");
            continue;
        };
        if !seen.insert(url.clone()) {
            tracing::warn!(url = %url, lastmod = %lastmod, "Skipping repeated sitemap entry");
            continue;
        }

        let last_modified = parse_timestamp(article_sitemap_url, &lastmod)?;

        let mut metas = Vec::new();
        for image_block in images_by_article.get(&url).into_iter().flatten() {
            let image_modified = match &image_block.lastmod {
                Some(value) => parse_timestamp(image_sitemap_url, value)?,
                None => last_modified,
            };

            for image in &image_block.images {
                let Some(image_url) = &image.loc else {
                    continue;
                };
                metas.push(ImageMeta {
                    url: image_url.clone(),
                    title: image.title.clone().unwrap_or_default(),
                    caption: image.caption.clone().unwrap_or_default(),
                    last_modified: image_modified,
                });
            }
        }

        entries.push(DiscoveryEntry {
            url,
            rank: entries.len() as u32 + 1,
            last_modified,
            images: metas,
        });
    }

    Ok(entries)
}

fn parse_timestamp(source: &str, value: &str) -> Result<DateTime<Utc>, DiscoveryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| DiscoveryError::Timestamp {
            url: source.to_string(),
            value: value.to_string(),
        })
}
