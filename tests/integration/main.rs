//! Integration tests for the sync pipeline
//!
//! These tests use wiremock to serve sitemaps and article pages and run
//! full passes end-to-end against a temporary SQLite database.

mod ordering_tests;
mod sync_tests;

use article_sync::config::{
    Config, OutputConfig, ParserConfig, SitemapConfig, SyncConfig, UserAgentConfig,
};

/// Creates a test configuration pointing at a mock server
pub fn create_test_config(base_url: &str, db_path: &str) -> Config {
    Config {
        sync: SyncConfig {
            max_concurrent_fetches: 8,
            request_timeout_ms: 300,
            max_fetch_attempts: 5,
            retry_delay_ms: 10,
            interval_secs: None,
        },
        sitemap: SitemapConfig {
            article_sitemap_url: format!("{}/sitemap-1.xml", base_url),
            image_sitemap_url: format!("{}/image-sitemap-1.xml", base_url),
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestSync".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        parser: ParserConfig::default(),
    }
}

/// Builds a content sitemap from `(url, lastmod)` pairs
pub fn content_sitemap(entries: &[(String, &str)]) -> String {
    let urls: String = entries
        .iter()
        .map(|(loc, lastmod)| {
            format!(
                "<url><loc>{}</loc><lastmod>{}</lastmod></url>",
                loc, lastmod
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
        urls
    )
}

/// Builds an image sitemap from `(article url, [image urls])` pairs
pub fn image_sitemap(entries: &[(String, Vec<String>)]) -> String {
    let urls: String = entries
        .iter()
        .map(|(loc, images)| {
            let images: String = images
                .iter()
                .map(|image| {
                    format!(
                        "<image:image><image:loc>{0}</image:loc><image:title>Title {0}</image:title><image:caption>Caption {0}</image:caption></image:image>",
                        image
                    )
                })
                .collect();
            format!("<url><loc>{}</loc>{}</url>", loc, images)
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9" xmlns:image="http://www.google.com/schemas/sitemap-image/1.1">{}</urlset>"#,
        urls
    )
}

/// Renders an article page the default parser selectors understand
pub fn article_html(title: &str, author: &str, body: &str) -> String {
    format!(
        r#"<html><body><main><article>
<h2 class="entry-title">{}</h2>
<span class="author"><a href="/author">{}</a></span>
<time class="published" datetime="2024-01-01T08:00:00+00:00">Jan 1</time>
<p>{}</p>
<footer><span class="cat-links"><a href="/c/news">News</a></span></footer>
</article></main></body></html>"#,
        title, author, body
    )
}
