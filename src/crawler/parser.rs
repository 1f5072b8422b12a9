//! HTML parser for article pages
//!
//! This module turns a fetched article page into [`ArticleContent`]:
//! - Body paragraphs, categories and tags (all optional)
//! - Author, title and publish time (required)
//! - Reader comments, in page order
//!
//! Every field is located with a CSS selector taken from the `[parser]`
//! config section.

use crate::config::{compile_selector, ParserConfig};
use crate::storage::{ArticleContent, Comment};
use crate::ConfigError;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

/// Why a page did not yield a usable article
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field} timestamp: {value:?}")]
    InvalidDate { field: &'static str, value: String },
}

/// Turns a response body into article content
pub trait DocumentParser: Send + Sync + 'static {
    fn parse(&self, url: &str, body: &str) -> Result<ArticleContent, ParseError>;
}

/// Selector-driven parser for WordPress-style article pages
#[derive(Debug, Clone)]
pub struct ArticleParser {
    body: Selector,
    categories: Selector,
    tags: Selector,
    author: Selector,
    published: Selector,
    title: Selector,
    comments: Selector,
    comment_time: Selector,
    comment_author: Selector,
    comment_text: Selector,
}

impl ArticleParser {
    pub fn new(config: &ParserConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            body: compile_selector("body", &config.body)?,
            categories: compile_selector("categories", &config.categories)?,
            tags: compile_selector("tags", &config.tags)?,
            author: compile_selector("author", &config.author)?,
            published: compile_selector("published", &config.published)?,
            title: compile_selector("title", &config.title)?,
            comments: compile_selector("comments", &config.comments)?,
            comment_time: compile_selector("comment-time", &config.comment_time)?,
            comment_author: compile_selector("comment-author", &config.comment_author)?,
            comment_text: compile_selector("comment-text", &config.comment_text)?,
        })
    }

    fn extract_comments(&self, document: &Html) -> Vec<Comment> {
        let mut comments = Vec::new();

        for node in document.select(&self.comments) {
            let published = node
                .select(&self.comment_time)
                .next()
                .and_then(|time| time.value().attr("datetime"))
                .and_then(|value| parse_datetime(value).ok());
            let author = first_text(node, &self.comment_author);
            let text = first_text(node, &self.comment_text);

            match (published, author, text) {
                (Some(date_published), Some(author), Some(text)) => comments.push(Comment {
                    author,
                    text,
                    date_published,
                }),
                _ => tracing::trace!("Skipping incomplete comment"),
            }
        }

        comments
    }
}

impl DocumentParser for ArticleParser {
    fn parse(&self, url: &str, body: &str) -> Result<ArticleContent, ParseError> {
        let document = Html::parse_document(body);
        let root = document.root_element();

        let author = first_text(root, &self.author).ok_or(ParseError::MissingField("author"))?;

        let published = document
            .select(&self.published)
            .next()
            .and_then(|time| time.value().attr("datetime"))
            .ok_or(ParseError::MissingField("date_published"))?;
        let date_published =
            parse_datetime(published).map_err(|_| ParseError::InvalidDate {
                field: "date_published",
                value: published.to_string(),
            })?;

        let title = first_text(root, &self.title).ok_or(ParseError::MissingField("title"))?;

        let paragraphs: Vec<String> = document
            .select(&self.body)
            .map(element_text)
            .filter(|p| !p.is_empty())
            .collect();

        let content = ArticleContent {
            author,
            title,
            body: paragraphs.join("\n\n"),
            date_published,
            categories: all_texts(&document, &self.categories),
            tags: all_texts(&document, &self.tags),
            comments: self.extract_comments(&document),
        };

        tracing::trace!(
            url,
            paragraphs = paragraphs.len(),
            comments = content.comments.len(),
            "Parsed article"
        );

        Ok(content)
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Text of the first match under `scope`, if it is non-empty
fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())
}

/// Non-empty texts of every match, duplicates dropped, first occurrence kept
fn all_texts(document: &Html, selector: &Selector) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in document.select(selector).map(element_text) {
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value.trim()).map(|ts| ts.with_timezone(&Utc))
}
