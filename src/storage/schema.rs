//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Article-Sync database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track sync passes
CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    discovered INTEGER NOT NULL DEFAULT 0,
    fetched INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    store_failures INTEGER NOT NULL DEFAULT 0
);

-- One row per article URL; content columns stay NULL while a placeholder
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    sitemap_rank INTEGER NOT NULL,
    last_modified TEXT NOT NULL,
    author TEXT,
    title TEXT,
    body TEXT,
    date_published TEXT,
    created_at TEXT NOT NULL,
    synced_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_articles_url ON articles(url);
CREATE INDEX IF NOT EXISTS idx_articles_author ON articles(author);

CREATE TABLE IF NOT EXISTS article_images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    caption TEXT NOT NULL,
    last_modified TEXT NOT NULL,
    UNIQUE(article_id, url)
);

CREATE INDEX IF NOT EXISTS idx_article_images_article ON article_images(article_id);

CREATE TABLE IF NOT EXISTS article_comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    author TEXT NOT NULL,
    text TEXT NOT NULL,
    date_published TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_article_comments_article ON article_comments(article_id);

CREATE TABLE IF NOT EXISTS article_categories (
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    UNIQUE(article_id, name)
);

CREATE INDEX IF NOT EXISTS idx_article_categories_name ON article_categories(name);

CREATE TABLE IF NOT EXISTS article_tags (
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    UNIQUE(article_id, name)
);

CREATE INDEX IF NOT EXISTS idx_article_tags_name ON article_tags(name);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
