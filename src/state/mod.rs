//! State module for tracking fetch progress
//!
//! `TaskState` is the per-URL lifecycle the fetch manager drives each article
//! through, from admission to its single terminal outcome.

mod task_state;

pub use task_state::TaskState;
