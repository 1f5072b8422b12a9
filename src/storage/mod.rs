//! Storage module for persisting synchronized articles
//!
//! This module handles all database operations for the synchronizer, including:
//! - SQLite database initialization and schema management
//! - Placeholder creation, content replacement and deletion of articles
//! - Image metadata reconciliation
//! - Sync run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{RunCounters, SqliteStorage};
pub use traits::{ArticleStore, StorageError, StorageResult};

use chrono::{DateTime, Utc};

/// An article as persisted, placeholder or fully synced
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub id: i64,
    pub url: String,
    pub rank: u32,
    pub last_modified: DateTime<Utc>,
    /// `None` while the record is still a placeholder
    pub content: Option<ArticleContent>,
    pub images: Vec<StoredImage>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl ArticleRecord {
    pub fn is_placeholder(&self) -> bool {
        self.content.is_none()
    }
}

/// Content fields written once a fetched page parses successfully
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleContent {
    pub author: String,
    pub title: String,
    pub body: String,
    pub date_published: DateTime<Utc>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub comments: Vec<Comment>,
}

/// A reader comment, kept in page order
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub date_published: DateTime<Utc>,
}

/// Image metadata row attached to an article
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub id: i64,
    pub article_id: i64,
    pub url: String,
    pub title: String,
    pub caption: String,
    pub last_modified: DateTime<Utc>,
}

/// Represents a sync run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub discovered: u64,
    pub fetched: u64,
    pub updated: u64,
    pub deleted: u64,
    pub store_failures: u64,
}

/// Status of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "completed_with_errors" => Some(Self::CompletedWithErrors),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
