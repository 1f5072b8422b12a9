//! Statistics generation from the article database
//!
//! This module provides functionality for extracting and displaying
//! article and run statistics from the storage layer.

use crate::crawler::SyncReport;
use crate::storage::{RunRecord, SqliteStorage, StorageResult};

/// How many categories and tags to list
const TOP_NAMES: usize = 10;

/// Store statistics summary
#[derive(Debug, Clone)]
pub struct SyncStatistics {
    /// Total number of article records
    pub total_articles: u64,

    /// Records still waiting for their first successful fetch
    pub placeholders: u64,

    pub total_images: u64,
    pub total_comments: u64,

    /// Category names with article counts, most used first
    pub categories: Vec<(String, u64)>,

    /// Tag names with article counts, most used first
    pub tags: Vec<(String, u64)>,

    /// The most recent sync run, if any
    pub latest_run: Option<RunRecord>,
}

impl SyncStatistics {
    pub fn synced(&self) -> u64 {
        self.total_articles.saturating_sub(self.placeholders)
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(SyncStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &SqliteStorage) -> StorageResult<SyncStatistics> {
    Ok(SyncStatistics {
        total_articles: storage.count_articles()?,
        placeholders: storage.count_placeholders()?,
        total_images: storage.count_images()?,
        total_comments: storage.count_comments()?,
        categories: storage.category_counts()?,
        tags: storage.tag_counts()?,
        latest_run: storage.latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &SyncStatistics) {
    println!("=== Article Statistics ===\n");

    println!("Overview:");
    println!("  Articles: {}", stats.total_articles);
    println!(
        "  Synced: {} ({:.1}%)",
        stats.synced(),
        percentage(stats.synced(), stats.total_articles)
    );
    println!("  Placeholders: {}", stats.placeholders);
    println!("  Images: {}", stats.total_images);
    println!("  Comments: {}", stats.total_comments);
    println!();

    print_names("Categories", &stats.categories);
    print_names("Tags", &stats.tags);

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run (#{}):", run.id);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!(
                "  Discovered: {}, fetched: {}, updated: {}, deleted: {}",
                run.discovered, run.fetched, run.updated, run.deleted
            );
            if run.store_failures > 0 {
                println!("  Store failures: {}", run.store_failures);
            }
        }
        None => println!("No sync runs recorded yet"),
    }
}

/// Prints the report of a finished pass
pub fn print_report(report: &SyncReport) {
    println!("=== Sync Report ===\n");
    println!("  Status: {}", report.status().to_db_string());
    println!(
        "  Discovered: {} (new: {}, changed: {}, incomplete: {}, unchanged: {})",
        report.discovered, report.created, report.stale, report.incomplete, report.unchanged
    );
    println!(
        "  Images: {} created, {} updated",
        report.images_created, report.images_updated
    );
    println!(
        "  Fetches: {} dispatched, {} fetched",
        report.dispatched, report.fetched
    );
    println!(
        "  Articles: {} updated, {} deleted ({} fatal, {} unreachable, {} unparseable)",
        report.updated, report.deleted, report.fatal, report.exhausted, report.parse_failures
    );
    if report.store_failures > 0 {
        println!("  Store failures: {}", report.store_failures);
    }
    if report.abandoned > 0 {
        println!("  Abandoned fetches: {}", report.abandoned);
    }
    if report.rolled_back > 0 {
        println!("  Rolled back for the next pass: {}", report.rolled_back);
    }
}

fn print_names(label: &str, names: &[(String, u64)]) {
    if names.is_empty() {
        return;
    }

    println!("{} ({}):", label, names.len());
    for (name, count) in names.iter().take(TOP_NAMES) {
        println!("  {}: {}", name, count);
    }
    if names.len() > TOP_NAMES {
        println!("  ... and {} more", names.len() - TOP_NAMES);
    }
    println!();
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}
