//! End-to-end passes against a mock site

use crate::{article_html, content_sitemap, create_test_config, image_sitemap};
use article_sync::crawler::run_sync;
use article_sync::storage::{ArticleStore, RunStatus, SqliteStorage};
use article_sync::SyncError;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_page(server: &MockServer, route: &str, status: u16, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_sitemaps(server: &MockServer, content: String, images: String) {
    mount_page(server, "/sitemap-1.xml", 200, content).await;
    mount_page(server, "/image-sitemap-1.xml", 200, images).await;
}

fn open(db_path: &Path) -> SqliteStorage {
    SqliteStorage::new(db_path).expect("Failed to open database")
}

#[tokio::test]
async fn test_end_to_end_two_articles() {
    let server = MockServer::start().await;
    let base = server.uri();
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("articles.db");

    let a = format!("{}/a", base);
    let b = format!("{}/b", base);
    mount_sitemaps(
        &server,
        content_sitemap(&[
            (a.clone(), "2024-01-01T00:00:00Z"),
            (b.clone(), "2024-01-02T00:00:00Z"),
        ]),
        image_sitemap(&[(a.clone(), vec![format!("{}/a.jpg", base)])]),
    )
    .await;
    mount_page(&server, "/a", 200, article_html("Title A", "Author A", "Body A")).await;
    mount_page(&server, "/b", 200, article_html("Title B", "Author B", "Body B")).await;

    let config = create_test_config(&base, db_path.to_str().unwrap());
    let report = run_sync(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.discovered, 2);
    assert_eq!(report.created, 2);
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.updated, 2);
    assert_eq!(report.status(), RunStatus::Completed);

    let storage = open(&db_path);
    let record_a = storage.find_by_url(&a).unwrap().unwrap();
    let record_b = storage.find_by_url(&b).unwrap().unwrap();
    assert_eq!(record_a.rank, 1);
    assert_eq!(record_b.rank, 2);
    assert_eq!(record_a.images.len(), 1);

    let content_a = record_a.content.unwrap();
    assert_eq!(content_a.title, "Title A");
    assert_eq!(content_a.author, "Author A");
    assert_eq!(content_a.body, "Body A");
    assert_eq!(content_a.categories, vec!["News"]);
    assert_eq!(record_b.content.unwrap().title, "Title B");

    let run = storage.latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.updated, 2);
}

#[tokio::test]
async fn test_unchanged_sitemap_fetches_nothing() {
    let server = MockServer::start().await;
    let base = server.uri();
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("articles.db");

    let a = format!("{}/a", base);
    mount_sitemaps(
        &server,
        content_sitemap(&[(a.clone(), "2024-01-01T00:00:00Z")]),
        image_sitemap(&[]),
    )
    .await;
    // Verified when the server drops: only the first pass may fetch the page
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_html("T", "A", "B")))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&base, db_path.to_str().unwrap());
    run_sync(&config, "hash", CancellationToken::new())
        .await
        .unwrap();
    let second = run_sync(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second.unchanged, 1);
    assert_eq!(second.dispatched, 0);
    assert_eq!(second.updated, 0);
}

#[tokio::test]
async fn test_changed_timestamp_refetches() {
    let server = MockServer::start().await;
    let base = server.uri();
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("articles.db");
    let config = create_test_config(&base, db_path.to_str().unwrap());
    let a = format!("{}/a", base);

    mount_sitemaps(
        &server,
        content_sitemap(&[(a.clone(), "2024-01-01T00:00:00Z")]),
        image_sitemap(&[]),
    )
    .await;
    mount_page(&server, "/a", 200, article_html("Old", "A", "B")).await;
    run_sync(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    server.reset().await;
    mount_sitemaps(
        &server,
        content_sitemap(&[(a.clone(), "2024-02-01T00:00:00Z")]),
        image_sitemap(&[]),
    )
    .await;
    mount_page(&server, "/a", 200, article_html("New", "A", "B")).await;

    let report = run_sync(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stale, 1);
    assert_eq!(report.updated, 1);
    let record = open(&db_path).find_by_url(&a).unwrap().unwrap();
    assert_eq!(record.content.unwrap().title, "New");
}

#[tokio::test]
async fn test_not_found_deletes_placeholder_without_retry() {
    let server = MockServer::start().await;
    let base = server.uri();
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("articles.db");

    let gone = format!("{}/gone", base);
    mount_sitemaps(
        &server,
        content_sitemap(&[(gone.clone(), "2024-01-01T00:00:00Z")]),
        image_sitemap(&[(gone.clone(), vec![format!("{}/gone.jpg", base)])]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&base, db_path.to_str().unwrap());
    let report = run_sync(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.fatal, 1);
    assert_eq!(report.deleted, 1);

    let storage = open(&db_path);
    assert!(storage.find_by_url(&gone).unwrap().is_none());
    assert_eq!(storage.count_images().unwrap(), 0);
}

#[tokio::test]
async fn test_unparseable_page_deletes_placeholder() {
    let server = MockServer::start().await;
    let base = server.uri();
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("articles.db");

    let broken = format!("{}/broken", base);
    mount_sitemaps(
        &server,
        content_sitemap(&[(broken.clone(), "2024-01-01T00:00:00Z")]),
        image_sitemap(&[]),
    )
    .await;
    mount_page(&server, "/broken", 200, "<html><body>No article</body></html>".to_string()).await;

    let config = create_test_config(&base, db_path.to_str().unwrap());
    let report = run_sync(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.fetched, 1);
    assert_eq!(report.parse_failures, 1);
    assert!(open(&db_path).find_by_url(&broken).unwrap().is_none());
}

#[tokio::test]
async fn test_timeouts_are_retried_until_success() {
    let server = MockServer::start().await;
    let base = server.uri();
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("articles.db");

    let slow = format!("{}/slow", base);
    mount_sitemaps(
        &server,
        content_sitemap(&[(slow.clone(), "2024-01-01T00:00:00Z")]),
        image_sitemap(&[]),
    )
    .await;
    // First two attempts outlive the 300ms request timeout
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_html("Slow", "A", "B")))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&base, db_path.to_str().unwrap());
    let report = run_sync(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.dispatched, 1);
    assert_eq!(report.updated, 1);
    let record = open(&db_path).find_by_url(&slow).unwrap().unwrap();
    assert_eq!(record.content.unwrap().title, "Slow");
}

#[tokio::test]
async fn test_new_image_reconciled_without_refetch() {
    let server = MockServer::start().await;
    let base = server.uri();
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("articles.db");
    let config = create_test_config(&base, db_path.to_str().unwrap());
    let a = format!("{}/a", base);
    let sitemap = content_sitemap(&[(a.clone(), "2024-01-01T00:00:00Z")]);

    mount_sitemaps(
        &server,
        sitemap.clone(),
        image_sitemap(&[(a.clone(), vec![format!("{}/1.jpg", base)])]),
    )
    .await;
    mount_page(&server, "/a", 200, article_html("T", "A", "B")).await;
    run_sync(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    server.reset().await;
    mount_sitemaps(
        &server,
        sitemap,
        image_sitemap(&[(
            a.clone(),
            vec![format!("{}/1.jpg", base), format!("{}/2.jpg", base)],
        )]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let report = run_sync(&config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.dispatched, 0);
    assert_eq!(report.images_created, 1);
    let record = open(&db_path).find_by_url(&a).unwrap().unwrap();
    assert_eq!(record.images.len(), 2);
    assert_eq!(record.content.unwrap().title, "T");
}

#[tokio::test]
async fn test_discovery_failure_aborts_pass() {
    let server = MockServer::start().await;
    let base = server.uri();
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("articles.db");

    mount_page(
        &server,
        "/sitemap-1.xml",
        200,
        content_sitemap(&[(format!("{}/a", base), "2024-01-01T00:00:00Z")]),
    )
    .await;
    mount_page(&server, "/image-sitemap-1.xml", 500, String::new()).await;

    let config = create_test_config(&base, db_path.to_str().unwrap());
    let result = run_sync(&config, "hash", CancellationToken::new()).await;

    assert!(matches!(result, Err(SyncError::Discovery(_))));

    let storage = open(&db_path);
    assert_eq!(storage.count_articles().unwrap(), 0);
    assert_eq!(storage.latest_run().unwrap().unwrap().status, RunStatus::Failed);
}
