//! Crawler module for article fetching and processing
//!
//! This module contains the core sync pipeline, including:
//! - HTTP fetching with per-request timeouts
//! - The sync planner deciding what needs a fetch
//! - Bounded-concurrency fetching with retry of transient failures
//! - Article page parsing
//! - Overall pass coordination

mod coordinator;
mod fetcher;
mod manager;
mod parser;
mod planner;

pub use coordinator::{run_recorded, run_sync, Coordinator, SyncOptions, SyncReport};
pub use fetcher::{build_http_client, Fetch, FetchError, HttpFetcher};
pub use manager::{FetchEvent, FetchManager, RetryPolicy};
pub use parser::{ArticleParser, DocumentParser, ParseError};
pub use planner::{PlanDecision, SyncPlanner};
