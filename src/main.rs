//! Article-Sync main entry point
//!
//! This is the command-line interface for the Article-Sync synchronizer.

use anyhow::{bail, Context};
use article_sync::config::{load_config_with_hash, Config};
use article_sync::crawler::run_sync;
use article_sync::output::{load_statistics, print_report, print_statistics};
use article_sync::storage::SqliteStorage;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Article-Sync: incremental sitemap-driven article synchronizer
///
/// Article-Sync reads a site's article and image sitemaps, stores every
/// article in SQLite, and on later passes re-fetches only the articles
/// whose last-modified timestamp changed.
#[derive(Parser, Debug)]
#[command(name = "article-sync")]
#[command(version)]
#[command(about = "Incremental sitemap-driven article synchronizer", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the effective settings without syncing
    #[arg(long, conflicts_with_all = ["stats", "watch"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "watch"])]
    stats: bool,

    /// Keep syncing every `interval-secs` until interrupted
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    watch: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }
    if cli.stats {
        return handle_stats(&config);
    }

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    if cli.watch {
        handle_watch(&config, &config_hash, cancel).await
    } else {
        handle_sync(&config, &config_hash, cancel).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("article_sync=info,warn"),
            1 => EnvFilter::new("article_sync=debug,info"),
            2 => EnvFilter::new("article_sync=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Cancels `cancel` on the first Ctrl-C
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing up");
            cancel.cancel();
        }
    });
}

/// Handles the --dry-run mode: validates config and shows the effective settings
fn handle_dry_run(config: &Config) {
    println!("=== Article-Sync Dry Run ===\n");

    println!("Sync Configuration:");
    println!(
        "  Max concurrent fetches: {}",
        config.sync.max_concurrent_fetches
    );
    println!("  Request timeout: {}ms", config.sync.request_timeout_ms);
    match config.sync.attempt_limit() {
        Some(limit) => println!("  Max fetch attempts: {}", limit),
        None => println!("  Max fetch attempts: unbounded"),
    }
    println!("  Retry delay: {}ms", config.sync.retry_delay_ms);
    if let Some(interval) = config.sync.interval_secs {
        println!("  Watch interval: {}s", interval);
    }

    println!("\nSitemaps:");
    println!("  Articles: {}", config.sitemap.article_sitemap_url);
    println!("  Images: {}", config.sitemap.image_sitemap_url);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nParser Selectors:");
    println!("  Title: {}", config.parser.title);
    println!("  Author: {}", config.parser.author);
    println!("  Published: {}", config.parser.published);
    println!("  Body: {}", config.parser.body);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage)?;

    print_statistics(&stats);

    Ok(())
}

/// Handles a single sync pass
async fn handle_sync(
    config: &Config,
    config_hash: &str,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    tracing::info!(
        "Syncing from {} ({} concurrent fetches)",
        config.sitemap.article_sitemap_url,
        config.sync.max_concurrent_fetches
    );

    let report = run_sync(config, config_hash, cancel)
        .await
        .context("Sync pass failed")?;
    print_report(&report);

    Ok(())
}

/// Handles the --watch mode: repeats passes until interrupted
async fn handle_watch(
    config: &Config,
    config_hash: &str,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let Some(interval) = config.sync.interval_secs else {
        bail!("--watch requires sync.interval-secs in the configuration");
    };
    let interval = Duration::from_secs(interval);

    while !cancel.is_cancelled() {
        // A failed pass is logged and retried on the next tick
        match run_sync(config, config_hash, cancel.clone()).await {
            Ok(report) => print_report(&report),
            Err(e) => tracing::error!("Sync pass failed: {}", e),
        }

        tracing::info!("Next pass in {:?}", interval);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("Watch stopped");
    Ok(())
}
