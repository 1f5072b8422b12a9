//! Ordering and concurrency properties, observed through recording fakes

use article_sync::config::{ParserConfig, SitemapConfig};
use article_sync::crawler::{
    ArticleParser, Coordinator, Fetch, FetchError, RetryPolicy, SyncOptions,
};
use article_sync::storage::{
    ArticleContent, ArticleRecord, ArticleStore, SqliteStorage, StorageResult, StoredImage,
};
use article_sync::{DiscoveryEntry, ImageMeta};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{article_html, content_sitemap};

const ARTICLES: &str = "https://news.example/sitemap-1.xml";
const IMAGES: &str = "https://news.example/image-sitemap-1.xml";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Create(String),
    Fetch(String),
}

type Log = Arc<Mutex<Vec<Event>>>;

/// SQLite store that records every placeholder creation
struct RecordingStore {
    inner: SqliteStorage,
    log: Log,
}

impl ArticleStore for RecordingStore {
    fn find_by_url(&self, url: &str) -> StorageResult<Option<ArticleRecord>> {
        self.inner.find_by_url(url)
    }

    fn create_placeholder(&self, entry: &DiscoveryEntry) -> StorageResult<i64> {
        let id = self.inner.create_placeholder(entry)?;
        self.log.lock().unwrap().push(Event::Create(entry.url.clone()));
        Ok(id)
    }

    fn update_last_modified(&self, url: &str, last_modified: DateTime<Utc>) -> StorageResult<()> {
        self.inner.update_last_modified(url, last_modified)
    }

    fn update_rank(&self, url: &str, rank: u32) -> StorageResult<()> {
        self.inner.update_rank(url, rank)
    }

    fn find_image(&self, article_id: i64, image_url: &str) -> StorageResult<Option<StoredImage>> {
        self.inner.find_image(article_id, image_url)
    }

    fn create_image(&self, article_id: i64, image: &ImageMeta) -> StorageResult<()> {
        self.inner.create_image(article_id, image)
    }

    fn update_image(&self, image_id: i64, image: &ImageMeta) -> StorageResult<()> {
        self.inner.update_image(image_id, image)
    }

    fn apply_content(&self, url: &str, content: &ArticleContent) -> StorageResult<bool> {
        self.inner.apply_content(url, content)
    }

    fn delete(&self, url: &str) -> StorageResult<bool> {
        self.inner.delete(url)
    }
}

/// Serves canned bodies, recording article fetches and peak concurrency
struct RecordingFetcher {
    pages: HashMap<String, String>,
    log: Log,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Fetch for RecordingFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        if url == ARTICLES || url == IMAGES {
            return self
                .pages
                .get(url)
                .cloned()
                .ok_or(FetchError::Fatal { status: 404 });
        }

        self.log.lock().unwrap().push(Event::Fetch(url.to_string()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.pages
            .get(url)
            .cloned()
            .ok_or(FetchError::Fatal { status: 404 })
    }
}

fn setup(urls: &[String], delay: Duration) -> (Arc<RecordingFetcher>, Arc<RecordingStore>, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let mut pages: HashMap<String, String> = urls
        .iter()
        .map(|url| (url.clone(), article_html(url, "Desk", "Body")))
        .collect();
    let listed: Vec<(String, &str)> = urls
        .iter()
        .map(|url| (url.clone(), "2024-01-01T00:00:00Z"))
        .collect();
    pages.insert(ARTICLES.to_string(), content_sitemap(&listed));
    pages.insert(IMAGES.to_string(), "<urlset/>".to_string());

    let fetcher = Arc::new(RecordingFetcher {
        pages,
        log: Arc::clone(&log),
        delay,
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let store = Arc::new(RecordingStore {
        inner: SqliteStorage::open_in_memory().unwrap(),
        log: Arc::clone(&log),
    });

    (fetcher, store, log)
}

fn coordinator(
    fetcher: Arc<RecordingFetcher>,
    store: Arc<RecordingStore>,
    max_in_flight: usize,
) -> Coordinator<RecordingFetcher, ArticleParser, RecordingStore> {
    Coordinator::new(
        fetcher,
        Arc::new(ArticleParser::new(&ParserConfig::default()).unwrap()),
        store,
        SitemapConfig {
            article_sitemap_url: ARTICLES.to_string(),
            image_sitemap_url: IMAGES.to_string(),
        },
        SyncOptions {
            max_in_flight,
            retry: RetryPolicy {
                max_attempts: Some(3),
                delay: Duration::from_millis(1),
            },
        },
        CancellationToken::new(),
    )
}

#[tokio::test]
async fn test_placeholder_created_before_fetch() {
    let urls: Vec<String> = (0..20)
        .map(|i| format!("https://news.example/article-{}", i))
        .collect();
    let (fetcher, store, log) = setup(&urls, Duration::from_millis(2));

    let report = coordinator(fetcher, Arc::clone(&store), 8).run().await.unwrap();
    assert_eq!(report.updated, 20);

    let log = log.lock().unwrap();
    for url in &urls {
        let created = log
            .iter()
            .position(|e| *e == Event::Create(url.clone()))
            .expect("placeholder was created");
        let fetched = log
            .iter()
            .position(|e| *e == Event::Fetch(url.clone()))
            .expect("article was fetched");
        assert!(created < fetched, "{} fetched before its placeholder", url);
    }

    // Placeholders are created in sitemap order
    let creates: Vec<&Event> = log.iter().filter(|e| matches!(e, Event::Create(_))).collect();
    let expected: Vec<Event> = urls.iter().map(|u| Event::Create(u.clone())).collect();
    assert_eq!(creates, expected.iter().collect::<Vec<_>>());
}

#[tokio::test]
async fn test_in_flight_fetches_never_exceed_limit() {
    let urls: Vec<String> = (0..40)
        .map(|i| format!("https://news.example/article-{}", i))
        .collect();
    let (fetcher, store, _log) = setup(&urls, Duration::from_millis(15));

    let report = coordinator(Arc::clone(&fetcher), store, 8).run().await.unwrap();

    assert_eq!(report.dispatched, 40);
    assert_eq!(report.updated, 40);
    let peak = fetcher.peak.load(Ordering::SeqCst);
    assert!(peak <= 8, "peak in-flight was {}", peak);
}

#[tokio::test]
async fn test_every_url_fetched_once_per_pass() {
    let urls: Vec<String> = (0..12)
        .map(|i| format!("https://news.example/article-{}", i))
        .collect();
    let (fetcher, store, log) = setup(&urls, Duration::from_millis(1));

    coordinator(fetcher, store, 3).run().await.unwrap();

    let log = log.lock().unwrap();
    for url in &urls {
        let fetches = log.iter().filter(|e| **e == Event::Fetch(url.clone())).count();
        assert_eq!(fetches, 1, "{} fetched {} times", url, fetches);
    }
}

#[tokio::test]
async fn test_repeated_sitemap_url_fetched_once() {
    let url = "https://news.example/article-0".to_string();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let mut pages = HashMap::new();
    pages.insert(url.clone(), article_html(&url, "Desk", "Body"));
    pages.insert(
        ARTICLES.to_string(),
        content_sitemap(&[
            (url.clone(), "2024-01-01T00:00:00Z"),
            (url.clone(), "2024-01-02T00:00:00Z"),
        ]),
    );
    pages.insert(IMAGES.to_string(), "<urlset/>".to_string());

    let fetcher = Arc::new(RecordingFetcher {
        pages,
        log: Arc::clone(&log),
        delay: Duration::from_millis(5),
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let store = Arc::new(RecordingStore {
        inner: SqliteStorage::open_in_memory().unwrap(),
        log: Arc::clone(&log),
    });

    let report = coordinator(fetcher, Arc::clone(&store), 8).run().await.unwrap();

    assert_eq!(report.discovered, 1);
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.updated, 1);
    let fetches = log
        .lock()
        .unwrap()
        .iter()
        .filter(|e| **e == Event::Fetch(url.clone()))
        .count();
    assert_eq!(fetches, 1);

    let record = store.find_by_url(&url).unwrap().unwrap();
    assert_eq!(record.rank, 1);
    assert_eq!(record.last_modified.to_rfc3339(), "2024-01-01T00:00:00+00:00");
}
