//! Sync coordinator - main pass orchestration logic
//!
//! A pass runs as three stages connected by bounded channels:
//! - discovery + planning, which feeds URLs needing a fetch
//! - the fetch manager, which turns URLs into completion events
//! - the completion consumer, which parses and persists (or deletes)
//!
//! Closing the URL channel tells the manager to finish what it has admitted
//! and stop; the consumer ends once the manager drops its event sender.
//!
//! A URL forwarded for a fetch that ends the pass without a verdict has its
//! planner changes undone, so the next pass picks it up again.

use crate::config::{Config, SitemapConfig, SyncConfig};
use crate::crawler::fetcher::{build_http_client, Fetch, HttpFetcher};
use crate::crawler::manager::{FetchEvent, FetchManager, RetryPolicy};
use crate::crawler::parser::{ArticleParser, DocumentParser};
use crate::crawler::planner::{PlanDecision, SyncPlanner};
use crate::sitemap::{DiscoveryEntry, SitemapSource};
use crate::storage::{ArticleStore, RunCounters, RunStatus, SqliteStorage};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Tunables for one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Ceiling for in-flight fetches, and for concurrent parse+persist work
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
}

impl SyncOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_in_flight: config.max_concurrent_fetches as usize,
            retry: RetryPolicy::from_config(config),
        }
    }
}

/// Counters collected over one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub discovered: u64,
    pub created: u64,
    pub stale: u64,
    /// Placeholders left without content by an earlier pass
    pub incomplete: u64,
    pub unchanged: u64,
    pub images_created: u64,
    pub images_updated: u64,
    /// URLs admitted by the fetch manager
    pub dispatched: u64,
    /// URLs whose body was retrieved
    pub fetched: u64,
    pub updated: u64,
    pub deleted: u64,
    pub fatal: u64,
    pub exhausted: u64,
    pub parse_failures: u64,
    pub store_failures: u64,
    /// Fetch tasks that broke down without a verdict on their URL
    pub abandoned: u64,
    /// URLs whose planner changes were undone at the end of the pass
    pub rolled_back: u64,
    pub cancelled: bool,
}

impl SyncReport {
    pub fn status(&self) -> RunStatus {
        if self.cancelled {
            RunStatus::Interrupted
        } else if self.store_failures > 0 || self.rolled_back > 0 {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        }
    }

    pub fn counters(&self) -> RunCounters {
        RunCounters {
            discovered: self.discovered,
            fetched: self.fetched,
            updated: self.updated,
            deleted: self.deleted,
            store_failures: self.store_failures,
        }
    }
}

/// Counters owned by the planning stage
#[derive(Debug, Default)]
struct PlanStats {
    created: u64,
    stale: u64,
    incomplete: u64,
    unchanged: u64,
    images_created: u64,
    images_updated: u64,
    store_failures: u64,
    /// URLs prepared for a fetch, with the decision that prepared them
    forwarded: Vec<(String, PlanDecision)>,
}

/// What the consumer did with one completion event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Updated,
    Deleted(DeleteReason),
    /// The record disappeared before the write landed
    Vanished,
    StoreFailed,
    Abandoned,
}

impl Completion {
    /// Whether the store now reflects a final verdict for the URL
    fn is_resolved(&self) -> bool {
        matches!(self, Self::Updated | Self::Deleted(_) | Self::Vanished)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeleteReason {
    Fatal,
    Exhausted,
    ParseFailed,
}

/// Main sync coordinator structure
pub struct Coordinator<F, P, S> {
    fetcher: Arc<F>,
    parser: Arc<P>,
    store: Arc<S>,
    sitemap: SitemapConfig,
    options: SyncOptions,
    cancel: CancellationToken,
}

impl<F, P, S> Coordinator<F, P, S>
where
    F: Fetch,
    P: DocumentParser,
    S: ArticleStore + 'static,
{
    pub fn new(
        fetcher: Arc<F>,
        parser: Arc<P>,
        store: Arc<S>,
        sitemap: SitemapConfig,
        options: SyncOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            parser,
            store,
            sitemap,
            options,
            cancel,
        }
    }

    /// Runs one complete pass
    ///
    /// Fails only when discovery fails or the planner or manager task dies.
    /// Store errors on individual URLs are logged and counted in the report
    /// instead.
    pub async fn run(&self) -> crate::Result<SyncReport> {
        let start_time = std::time::Instant::now();
        let mut report = SyncReport::default();

        let source = SitemapSource::new(Arc::clone(&self.fetcher), &self.sitemap);
        let entries = tokio::select! {
            biased;

            _ = self.cancel.cancelled() => {
                tracing::info!("Pass cancelled during discovery");
                report.cancelled = true;
                return Ok(report);
            }
            discovered = source.discover() => discovered?,
        };
        report.discovered = entries.len() as u64;

        let capacity = self.options.max_in_flight.max(1);
        let (url_tx, url_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);

        let manager = FetchManager::new(
            Arc::clone(&self.fetcher),
            capacity,
            self.options.retry,
            self.cancel.clone(),
        );
        let manager_handle = tokio::spawn(manager.run(url_rx, event_tx));

        let planner_handle = tokio::spawn(plan_entries(
            entries,
            SyncPlanner::new(Arc::clone(&self.store)),
            url_tx,
            self.cancel.clone(),
        ));

        let completions = self.consume(event_rx, capacity).await;

        let plan = planner_handle.await?;
        report.dispatched = manager_handle.await? as u64;

        report.created = plan.created;
        report.stale = plan.stale;
        report.incomplete = plan.incomplete;
        report.unchanged = plan.unchanged;
        report.images_created = plan.images_created;
        report.images_updated = plan.images_updated;
        report.store_failures = plan.store_failures;

        report.fetched = completions.fetched;
        let mut resolved = HashSet::new();
        for (url, completion) in completions.outcomes {
            if completion.is_resolved() {
                resolved.insert(url);
            }
            match completion {
                Completion::Updated => report.updated += 1,
                Completion::Deleted(reason) => {
                    report.deleted += 1;
                    match reason {
                        DeleteReason::Fatal => report.fatal += 1,
                        DeleteReason::Exhausted => report.exhausted += 1,
                        DeleteReason::ParseFailed => report.parse_failures += 1,
                    }
                }
                Completion::Vanished => {}
                Completion::StoreFailed => report.store_failures += 1,
                Completion::Abandoned => report.abandoned += 1,
            }
        }

        let unresolved: Vec<_> = plan
            .forwarded
            .into_iter()
            .filter(|(url, _)| !resolved.contains(url))
            .collect();
        self.roll_back(unresolved, &mut report);

        report.cancelled = self.cancel.is_cancelled();

        tracing::info!(
            discovered = report.discovered,
            created = report.created,
            stale = report.stale,
            incomplete = report.incomplete,
            unchanged = report.unchanged,
            fetched = report.fetched,
            updated = report.updated,
            deleted = report.deleted,
            store_failures = report.store_failures,
            rolled_back = report.rolled_back,
            "Pass finished in {:?}",
            start_time.elapsed()
        );

        Ok(report)
    }

    /// Drains completion events, running parse+persist under its own ceiling
    ///
    /// A handler that panics leaves no outcome, so its URL counts as
    /// unresolved.
    async fn consume(&self, mut events: mpsc::Receiver<FetchEvent>, capacity: usize) -> Completions {
        let slots = Arc::new(Semaphore::new(capacity));
        let mut work: JoinSet<(String, Completion)> = JoinSet::new();
        let mut completions = Completions::default();

        while let Some(event) = events.recv().await {
            if matches!(event, FetchEvent::Fetched { .. }) {
                completions.fetched += 1;
            }

            let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
                break;
            };
            let parser = Arc::clone(&self.parser);
            let store = Arc::clone(&self.store);

            work.spawn_blocking(move || {
                let _permit = permit;
                let url = event.url().to_string();
                (url, complete(parser.as_ref(), store.as_ref(), event))
            });

            while let Some(done) = work.try_join_next() {
                completions.record(done);
            }
        }

        while let Some(done) = work.join_next().await {
            completions.record(done);
        }

        completions
    }

    /// Undoes planner changes for URLs that never reached a verdict
    fn roll_back(&self, unresolved: Vec<(String, PlanDecision)>, report: &mut SyncReport) {
        if unresolved.is_empty() {
            return;
        }

        tracing::info!(count = unresolved.len(), "Rolling back unfinished articles");
        let planner = SyncPlanner::new(Arc::clone(&self.store));

        for (url, decision) in unresolved {
            match planner.undo(&url, decision) {
                Ok(()) => {
                    tracing::debug!(url = %url, "Rolled back");
                    report.rolled_back += 1;
                }
                Err(e) => {
                    tracing::error!(url = %url, error = %e, "Failed to roll back article");
                    report.store_failures += 1;
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct Completions {
    fetched: u64,
    outcomes: Vec<(String, Completion)>,
}

impl Completions {
    fn record(&mut self, done: Result<(String, Completion), tokio::task::JoinError>) {
        match done {
            Ok(outcome) => self.outcomes.push(outcome),
            Err(e) => tracing::error!(error = %e, "Completion handler panicked"),
        }
    }
}

/// Plans every entry in rank order, forwarding URLs that need a fetch
///
/// Dropping `urls` on return closes the request stream.
async fn plan_entries<S: ArticleStore>(
    entries: Vec<DiscoveryEntry>,
    planner: SyncPlanner<S>,
    urls: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> PlanStats {
    let mut stats = PlanStats::default();

    for entry in entries {
        if cancel.is_cancelled() {
            break;
        }

        let decision = match planner.plan(&entry) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!(url = %entry.url, error = %e, "Store error while planning; skipping");
                stats.store_failures += 1;
                continue;
            }
        };

        match decision {
            PlanDecision::Created => stats.created += 1,
            PlanDecision::Incomplete => stats.incomplete += 1,
            PlanDecision::Stale { .. } => stats.stale += 1,
            PlanDecision::Unchanged {
                images_created,
                images_updated,
            } => {
                stats.unchanged += 1;
                stats.images_created += images_created as u64;
                stats.images_updated += images_updated as u64;
            }
        }

        if !decision.needs_fetch() {
            continue;
        }

        stats.forwarded.push((entry.url.clone(), decision));
        if urls.send(entry.url).await.is_err() {
            tracing::debug!("Fetch manager stopped accepting URLs");
            break;
        }
    }

    stats
}

/// Applies one completion event to the store
fn complete<P, S>(parser: &P, store: &S, event: FetchEvent) -> Completion
where
    P: DocumentParser + ?Sized,
    S: ArticleStore + ?Sized,
{
    let attempts = event.attempts();
    let (url, reason) = match event {
        FetchEvent::Fetched { url, body, .. } => match parser.parse(&url, &body) {
            Ok(content) => {
                return match store.apply_content(&url, &content) {
                    Ok(true) => {
                        tracing::debug!(url = %url, attempts, "Article updated");
                        Completion::Updated
                    }
                    Ok(false) => {
                        tracing::warn!(url = %url, "Article vanished before its content was written");
                        Completion::Vanished
                    }
                    Err(e) => {
                        tracing::error!(url = %url, error = %e, "Failed to write article");
                        Completion::StoreFailed
                    }
                };
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Unusable article page; deleting record");
                (url, DeleteReason::ParseFailed)
            }
        },
        FetchEvent::Fatal { url, status, .. } => {
            tracing::warn!(url = %url, status, attempts, "Article fetch failed permanently; deleting record");
            (url, DeleteReason::Fatal)
        }
        FetchEvent::RetriesExhausted { url, last_error, .. } => {
            tracing::warn!(url = %url, attempts, error = %last_error, "Article unreachable; deleting record");
            (url, DeleteReason::Exhausted)
        }
        FetchEvent::Abandoned { url, reason, .. } => {
            tracing::warn!(url = %url, reason = %reason, "Fetch abandoned; leaving record for the next pass");
            return Completion::Abandoned;
        }
    };

    match store.delete(&url) {
        Ok(_) => Completion::Deleted(reason),
        Err(e) => {
            tracing::error!(url = %url, error = %e, "Failed to delete article");
            Completion::StoreFailed
        }
    }
}

/// Runs one pass from a loaded configuration, recording it as a sync run
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `config_hash` - Hash stored with the run record
/// * `cancel` - Token that aborts the pass when cancelled
pub async fn run_sync(
    config: &Config,
    config_hash: &str,
    cancel: CancellationToken,
) -> crate::Result<SyncReport> {
    let store = Arc::new(SqliteStorage::new(Path::new(&config.output.database_path))?);

    let client = build_http_client(&config.user_agent)?;
    let fetcher = Arc::new(HttpFetcher::new(client, config.sync.request_timeout()));
    let parser = Arc::new(ArticleParser::new(&config.parser)?);

    let coordinator = Coordinator::new(
        fetcher,
        parser,
        Arc::clone(&store),
        config.sitemap.clone(),
        SyncOptions::from_config(&config.sync),
        cancel,
    );

    run_recorded(&coordinator, &store, config_hash).await
}

/// Runs one pass of `coordinator`, bracketed by a run record in `runs`
pub async fn run_recorded<F, P, S>(
    coordinator: &Coordinator<F, P, S>,
    runs: &SqliteStorage,
    config_hash: &str,
) -> crate::Result<SyncReport>
where
    F: Fetch,
    P: DocumentParser,
    S: ArticleStore + 'static,
{
    let run_id = runs.create_run(config_hash)?;
    tracing::info!("Starting sync run {}", run_id);

    match coordinator.run().await {
        Ok(report) => {
            runs.finish_run(run_id, report.status(), report.counters())?;
            tracing::info!("Sync run {} finished: {}", run_id, report.status().to_db_string());
            Ok(report)
        }
        Err(e) => {
            tracing::error!("Sync run {} failed: {}", run_id, e);
            runs.finish_run(run_id, RunStatus::Failed, RunCounters::default())?;
            Err(e)
        }
    }
}
