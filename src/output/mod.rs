//! Output module for reporting on synchronized articles
//!
//! This module handles:
//! - Loading store statistics for `--stats`
//! - Printing the report of a finished pass

pub mod stats;

pub use stats::{load_statistics, print_report, print_statistics, SyncStatistics};
