//! Storage traits and error types
//!
//! `ArticleStore` is the contract the sync pipeline writes through. Every
//! method takes `&self` so one store can be shared by the planner and all
//! completion handlers at once.

use crate::sitemap::{DiscoveryEntry, ImageMeta};
use crate::storage::{ArticleContent, ArticleRecord, StoredImage};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Article not found: {0}")]
    ArticleNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt value in column {column}: {value}")]
    CorruptValue { column: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for article store implementations
///
/// Per-URL operations must be atomic. Callers never issue two writes for the
/// same URL concurrently, but writes for different URLs may overlap.
pub trait ArticleStore: Send + Sync {
    // ===== Lookup =====

    /// Loads an article with its images and content, if it exists
    fn find_by_url(&self, url: &str) -> StorageResult<Option<ArticleRecord>>;

    // ===== Planner writes =====

    /// Creates a placeholder from a discovery entry and returns its ID
    ///
    /// Only url, rank, last-modified and the entry's images are stored.
    fn create_placeholder(&self, entry: &DiscoveryEntry) -> StorageResult<i64>;

    /// Records a new sitemap timestamp for an existing article
    fn update_last_modified(&self, url: &str, last_modified: DateTime<Utc>) -> StorageResult<()>;

    /// Records a new sitemap position for an existing article
    fn update_rank(&self, url: &str, rank: u32) -> StorageResult<()>;

    /// Finds an image of `article_id` by its own URL
    fn find_image(&self, article_id: i64, image_url: &str) -> StorageResult<Option<StoredImage>>;

    fn create_image(&self, article_id: i64, image: &ImageMeta) -> StorageResult<()>;

    /// Overwrites title, caption and last-modified of an existing image row
    fn update_image(&self, image_id: i64, image: &ImageMeta) -> StorageResult<()>;

    // ===== Completion writes =====

    /// Replaces all content fields of an article in one transaction
    ///
    /// Returns `false` when the article no longer exists.
    fn apply_content(&self, url: &str, content: &ArticleContent) -> StorageResult<bool>;

    /// Deletes an article and everything attached to it
    ///
    /// Returns `false` when there was nothing to delete.
    fn delete(&self, url: &str) -> StorageResult<bool>;
}

impl<S: ArticleStore + ?Sized> ArticleStore for std::sync::Arc<S> {
    fn find_by_url(&self, url: &str) -> StorageResult<Option<ArticleRecord>> {
        (**self).find_by_url(url)
    }

    fn create_placeholder(&self, entry: &DiscoveryEntry) -> StorageResult<i64> {
        (**self).create_placeholder(entry)
    }

    fn update_last_modified(&self, url: &str, last_modified: DateTime<Utc>) -> StorageResult<()> {
        (**self).update_last_modified(url, last_modified)
    }

    fn update_rank(&self, url: &str, rank: u32) -> StorageResult<()> {
        (**self).update_rank(url, rank)
    }

    fn find_image(&self, article_id: i64, image_url: &str) -> StorageResult<Option<StoredImage>> {
        (**self).find_image(article_id, image_url)
    }

    fn create_image(&self, article_id: i64, image: &ImageMeta) -> StorageResult<()> {
        (**self).create_image(article_id, image)
    }

    fn update_image(&self, image_id: i64, image: &ImageMeta) -> StorageResult<()> {
        (**self).update_image(image_id, image)
    }

    fn apply_content(&self, url: &str, content: &ArticleContent) -> StorageResult<bool> {
        (**self).apply_content(url, content)
    }

    fn delete(&self, url: &str) -> StorageResult<bool> {
        (**self).delete(url)
    }
}
