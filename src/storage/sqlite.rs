//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ArticleStore trait.

use crate::sitemap::{DiscoveryEntry, ImageMeta};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ArticleStore, StorageError, StorageResult};
use crate::storage::{ArticleContent, ArticleRecord, Comment, RunRecord, RunStatus, StoredImage};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Counters written back to a run when it finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub discovered: u64,
    pub fetched: u64,
    pub updated: u64,
    pub deleted: u64,
    pub store_failures: u64,
}

/// SQLite storage backend
///
/// The connection sits behind a mutex so the store can be shared between the
/// planner and every completion handler.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path`, creating missing parent
    /// directories
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection mutex poisoned".to_string()))
    }

    // ===== Run Management =====

    /// Starts a new sync run and returns its ID
    pub fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![
                format_timestamp(Utc::now()),
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Closes a run with its final status and counters
    pub fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        counters: RunCounters,
    ) -> StorageResult<()> {
        let changed = self.conn()?.execute(
            "UPDATE sync_runs SET status = ?1, finished_at = ?2, discovered = ?3, fetched = ?4,
             updated = ?5, deleted = ?6, store_failures = ?7 WHERE id = ?8",
            params![
                status.to_db_string(),
                format_timestamp(Utc::now()),
                counters.discovered as i64,
                counters.fetched as i64,
                counters.updated as i64,
                counters.deleted as i64,
                counters.store_failures as i64,
                run_id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    /// Gets the most recent run
    pub fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, discovered, fetched,
                 updated, deleted, store_failures FROM sync_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                            .unwrap_or(RunStatus::Failed),
                        discovered: row.get::<_, i64>(5)? as u64,
                        fetched: row.get::<_, i64>(6)? as u64,
                        updated: row.get::<_, i64>(7)? as u64,
                        deleted: row.get::<_, i64>(8)? as u64,
                        store_failures: row.get::<_, i64>(9)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(run)
    }

    // ===== Statistics =====

    pub fn count_articles(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM articles")
    }

    /// Counts articles that have never had content written
    pub fn count_placeholders(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM articles WHERE synced_at IS NULL")
    }

    pub fn count_images(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM article_images")
    }

    pub fn count_comments(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM article_comments")
    }

    /// Distinct category names with their article counts, most used first
    pub fn category_counts(&self) -> StorageResult<Vec<(String, u64)>> {
        self.name_counts("article_categories")
    }

    /// Distinct tag names with their article counts, most used first
    pub fn tag_counts(&self) -> StorageResult<Vec<(String, u64)>> {
        self.name_counts("article_tags")
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn()?.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn name_counts(&self, table: &'static str) -> StorageResult<Vec<(String, u64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT name, COUNT(*) AS uses FROM {} GROUP BY name ORDER BY uses DESC, name ASC",
            table
        ))?;

        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }
}

impl ArticleStore for SqliteStorage {
    fn find_by_url(&self, url: &str) -> StorageResult<Option<ArticleRecord>> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                "SELECT id, url, sitemap_rank, last_modified, author, title, body, date_published,
                 synced_at FROM articles WHERE url = ?1",
                params![url],
                |row| ArticleRow::from_row(row),
            )
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };

        let images = load_images(&conn, row.id)?;

        let content = match (row.author, row.title, row.date_published) {
            (Some(author), Some(title), Some(date_published)) => Some(ArticleContent {
                author,
                title,
                body: row.body.unwrap_or_default(),
                date_published: parse_timestamp("date_published", &date_published)?,
                categories: load_names(&conn, "article_categories", row.id)?,
                tags: load_names(&conn, "article_tags", row.id)?,
                comments: load_comments(&conn, row.id)?,
            }),
            _ => None,
        };

        Ok(Some(ArticleRecord {
            id: row.id,
            url: row.url,
            rank: row.rank,
            last_modified: parse_timestamp("last_modified", &row.last_modified)?,
            content,
            images,
            synced_at: row
                .synced_at
                .as_deref()
                .map(|s| parse_timestamp("synced_at", s))
                .transpose()?,
        }))
    }

    fn create_placeholder(&self, entry: &DiscoveryEntry) -> StorageResult<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO articles (url, sitemap_rank, last_modified, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.url,
                entry.rank,
                format_timestamp(entry.last_modified),
                format_timestamp(Utc::now())
            ],
        )?;
        let article_id = tx.last_insert_rowid();

        for image in &entry.images {
            insert_image(&tx, article_id, image, true)?;
        }

        tx.commit()?;
        Ok(article_id)
    }

    fn update_last_modified(&self, url: &str, last_modified: DateTime<Utc>) -> StorageResult<()> {
        let changed = self.conn()?.execute(
            "UPDATE articles SET last_modified = ?1 WHERE url = ?2",
            params![format_timestamp(last_modified), url],
        )?;

        if changed == 0 {
            return Err(StorageError::ArticleNotFound(url.to_string()));
        }
        Ok(())
    }

    fn update_rank(&self, url: &str, rank: u32) -> StorageResult<()> {
        let changed = self.conn()?.execute(
            "UPDATE articles SET sitemap_rank = ?1 WHERE url = ?2",
            params![rank, url],
        )?;

        if changed == 0 {
            return Err(StorageError::ArticleNotFound(url.to_string()));
        }
        Ok(())
    }

    fn find_image(&self, article_id: i64, image_url: &str) -> StorageResult<Option<StoredImage>> {
        let conn = self.conn()?;
        let image = conn
            .query_row(
                "SELECT id, article_id, url, title, caption, last_modified
                 FROM article_images WHERE article_id = ?1 AND url = ?2",
                params![article_id, image_url],
                |row| ImageRow::from_row(row),
            )
            .optional()?;

        image.map(ImageRow::into_image).transpose()
    }

    fn create_image(&self, article_id: i64, image: &ImageMeta) -> StorageResult<()> {
        let conn = self.conn()?;
        insert_image(&conn, article_id, image, false)
    }

    fn update_image(&self, image_id: i64, image: &ImageMeta) -> StorageResult<()> {
        self.conn()?.execute(
            "UPDATE article_images SET title = ?1, caption = ?2, last_modified = ?3 WHERE id = ?4",
            params![
                image.title,
                image.caption,
                format_timestamp(image.last_modified),
                image_id
            ],
        )?;
        Ok(())
    }

    fn apply_content(&self, url: &str, content: &ArticleContent) -> StorageResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let article_id: Option<i64> = tx
            .query_row("SELECT id FROM articles WHERE url = ?1", params![url], |row| {
                row.get(0)
            })
            .optional()?;

        let Some(article_id) = article_id else {
            return Ok(false);
        };

        tx.execute(
            "UPDATE articles SET author = ?1, title = ?2, body = ?3, date_published = ?4,
             synced_at = ?5 WHERE id = ?6",
            params![
                content.author,
                content.title,
                content.body,
                format_timestamp(content.date_published),
                format_timestamp(Utc::now()),
                article_id
            ],
        )?;

        tx.execute(
            "DELETE FROM article_comments WHERE article_id = ?1",
            params![article_id],
        )?;
        tx.execute(
            "DELETE FROM article_categories WHERE article_id = ?1",
            params![article_id],
        )?;
        tx.execute(
            "DELETE FROM article_tags WHERE article_id = ?1",
            params![article_id],
        )?;

        for (position, comment) in content.comments.iter().enumerate() {
            tx.execute(
                "INSERT INTO article_comments (article_id, position, author, text, date_published)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    article_id,
                    position as i64,
                    comment.author,
                    comment.text,
                    format_timestamp(comment.date_published)
                ],
            )?;
        }

        for name in &content.categories {
            tx.execute(
                "INSERT OR IGNORE INTO article_categories (article_id, name) VALUES (?1, ?2)",
                params![article_id, name],
            )?;
        }

        for name in &content.tags {
            tx.execute(
                "INSERT OR IGNORE INTO article_tags (article_id, name) VALUES (?1, ?2)",
                params![article_id, name],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }

    fn delete(&self, url: &str) -> StorageResult<bool> {
        let changed = self
            .conn()?
            .execute("DELETE FROM articles WHERE url = ?1", params![url])?;
        Ok(changed > 0)
    }
}

/// Raw `articles` row before timestamp parsing
struct ArticleRow {
    id: i64,
    url: String,
    rank: u32,
    last_modified: String,
    author: Option<String>,
    title: Option<String>,
    body: Option<String>,
    date_published: Option<String>,
    synced_at: Option<String>,
}

impl ArticleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            url: row.get(1)?,
            rank: row.get(2)?,
            last_modified: row.get(3)?,
            author: row.get(4)?,
            title: row.get(5)?,
            body: row.get(6)?,
            date_published: row.get(7)?,
            synced_at: row.get(8)?,
        })
    }
}

struct ImageRow {
    id: i64,
    article_id: i64,
    url: String,
    title: String,
    caption: String,
    last_modified: String,
}

impl ImageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            article_id: row.get(1)?,
            url: row.get(2)?,
            title: row.get(3)?,
            caption: row.get(4)?,
            last_modified: row.get(5)?,
        })
    }

    fn into_image(self) -> StorageResult<StoredImage> {
        Ok(StoredImage {
            id: self.id,
            article_id: self.article_id,
            url: self.url,
            title: self.title,
            caption: self.caption,
            last_modified: parse_timestamp("last_modified", &self.last_modified)?,
        })
    }
}

fn insert_image(
    conn: &Connection,
    article_id: i64,
    image: &ImageMeta,
    ignore_duplicates: bool,
) -> StorageResult<()> {
    let verb = if ignore_duplicates {
        "INSERT OR IGNORE"
    } else {
        "INSERT"
    };

    conn.execute(
        &format!(
            "{} INTO article_images (article_id, url, title, caption, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            verb
        ),
        params![
            article_id,
            image.url,
            image.title,
            image.caption,
            format_timestamp(image.last_modified)
        ],
    )?;
    Ok(())
}

fn load_images(conn: &Connection, article_id: i64) -> StorageResult<Vec<StoredImage>> {
    let mut stmt = conn.prepare(
        "SELECT id, article_id, url, title, caption, last_modified
         FROM article_images WHERE article_id = ?1 ORDER BY id",
    )?;

    let rows = stmt
        .query_map(params![article_id], |row| ImageRow::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(ImageRow::into_image).collect()
}

fn load_names(conn: &Connection, table: &'static str, article_id: i64) -> StorageResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT name FROM {} WHERE article_id = ?1 ORDER BY rowid",
        table
    ))?;

    let names = stmt
        .query_map(params![article_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(names)
}

fn load_comments(conn: &Connection, article_id: i64) -> StorageResult<Vec<Comment>> {
    let mut stmt = conn.prepare(
        "SELECT author, text, date_published FROM article_comments
         WHERE article_id = ?1 ORDER BY position",
    )?;

    let rows = stmt
        .query_map(params![article_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(author, text, published)| {
            Ok(Comment {
                author,
                text,
                date_published: parse_timestamp("date_published", &published)?,
            })
        })
        .collect()
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(column: &'static str, value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| StorageError::CorruptValue {
            column,
            value: value.to_string(),
        })
}
