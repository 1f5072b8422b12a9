//! Bounded-concurrency fetch manager
//!
//! Admission works in two steps: first a slot is taken from the semaphore,
//! then the next URL is pulled from the request channel. A task keeps its
//! slot for every retry and gives it back only once it reaches a terminal
//! state, so at most `max_in_flight` URLs are ever being worked on.

use crate::config::SyncConfig;
use crate::crawler::fetcher::{Fetch, FetchError};
use crate::state::TaskState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// How transient failures are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until success or a fatal status
    pub max_attempts: Option<u32>,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.attempt_limit(),
            delay: config.retry_delay(),
        }
    }

    fn allows_another(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

/// Terminal outcome of one URL
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    Fetched {
        url: String,
        body: String,
        attempts: u32,
    },
    Fatal {
        url: String,
        status: u16,
        attempts: u32,
    },
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: FetchError,
    },
    /// The task broke down for a reason unrelated to the URL itself
    Abandoned {
        url: String,
        attempts: u32,
        reason: String,
    },
}

impl FetchEvent {
    pub fn url(&self) -> &str {
        match self {
            Self::Fetched { url, .. }
            | Self::Fatal { url, .. }
            | Self::RetriesExhausted { url, .. }
            | Self::Abandoned { url, .. } => url,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fetched { attempts, .. }
            | Self::Fatal { attempts, .. }
            | Self::RetriesExhausted { attempts, .. }
            | Self::Abandoned { attempts, .. } => *attempts,
        }
    }
}

/// Drives article fetches under a fixed concurrency ceiling
pub struct FetchManager<F> {
    fetcher: Arc<F>,
    slots: Arc<Semaphore>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl<F: Fetch> FetchManager<F> {
    pub fn new(
        fetcher: Arc<F>,
        max_in_flight: usize,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
            retry,
            cancel,
        }
    }

    /// Consumes `urls` until the channel closes, then waits for every
    /// admitted URL to finish
    ///
    /// Each admitted URL produces exactly one event on `events`, unless the
    /// run is cancelled or the task panics. Returns the number of URLs
    /// admitted.
    pub async fn run(
        self,
        mut urls: mpsc::Receiver<String>,
        events: mpsc::Sender<FetchEvent>,
    ) -> usize {
        let mut tasks: JoinSet<FetchEvent> = JoinSet::new();
        let mut accepting = true;
        let mut admitted = 0usize;

        loop {
            if !accepting && tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    tracing::info!(in_flight = tasks.len(), "Fetch manager cancelled");
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    break;
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    let event = match joined {
                        Ok(event) => event,
                        Err(e) if e.is_cancelled() => continue,
                        Err(e) => {
                            tracing::error!(error = %e, "Fetch task panicked; its URL is left unresolved");
                            continue;
                        }
                    };

                    if events.send(event).await.is_err() {
                        tracing::warn!("Completion consumer went away; stopping fetches");
                        tasks.abort_all();
                        while tasks.join_next().await.is_some() {}
                        break;
                    }
                }

                next = admit(&self.slots, &mut urls), if accepting => {
                    match next {
                        Some((permit, url)) => {
                            admitted += 1;
                            let fetcher = Arc::clone(&self.fetcher);
                            tasks.spawn(drive(fetcher, url, self.retry, permit));
                        }
                        None => {
                            tracing::debug!(in_flight = tasks.len(), "Request stream closed; draining");
                            accepting = false;
                        }
                    }
                }
            }
        }

        admitted
    }
}

/// Waits for a free slot, then for the next URL
async fn admit(
    slots: &Arc<Semaphore>,
    urls: &mut mpsc::Receiver<String>,
) -> Option<(OwnedSemaphorePermit, String)> {
    let permit = Arc::clone(slots).acquire_owned().await.ok()?;
    let url = urls.recv().await?;
    Some((permit, url))
}

/// Runs one URL to its terminal state while holding `_slot`
///
/// Always yields an event for `url`; internal errors become
/// [`FetchEvent::Abandoned`].
async fn drive<F: Fetch>(
    fetcher: Arc<F>,
    url: String,
    retry: RetryPolicy,
    _slot: OwnedSemaphorePermit,
) -> FetchEvent {
    let mut attempts = 0u32;

    match fetch_until_terminal(fetcher.as_ref(), &url, retry, &mut attempts).await {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(url = %url, attempts, error = %e, "Fetch task failed");
            FetchEvent::Abandoned {
                url,
                attempts,
                reason: e.to_string(),
            }
        }
    }
}

async fn fetch_until_terminal<F: Fetch>(
    fetcher: &F,
    url: &str,
    retry: RetryPolicy,
    attempts: &mut u32,
) -> crate::Result<FetchEvent> {
    let mut state = TaskState::Pending;

    loop {
        state.transition(TaskState::InFlight)?;
        *attempts += 1;
        tracing::debug!(url, attempt = *attempts, "Fetching article");

        let error = match fetcher.fetch(url).await {
            Ok(body) => {
                state.transition(TaskState::Succeeded)?;
                return Ok(FetchEvent::Fetched {
                    url: url.to_string(),
                    body,
                    attempts: *attempts,
                });
            }
            Err(e) => e,
        };

        if !error.is_fatal() && retry.allows_another(*attempts) {
            state.transition(TaskState::Retrying)?;
            tracing::debug!(url, attempt = *attempts, error = %error, "Transient failure; retrying");
            tokio::time::sleep(retry.delay).await;
            continue;
        }

        let event = match error {
            FetchError::Fatal { status } => {
                state.transition(TaskState::Fatal)?;
                tracing::info!(url, status, "Fatal response; not retrying");
                FetchEvent::Fatal {
                    url: url.to_string(),
                    status,
                    attempts: *attempts,
                }
            }
            last_error => {
                state.transition(TaskState::Exhausted)?;
                tracing::warn!(url, attempts = *attempts, error = %last_error, "Giving up after transient failures");
                FetchEvent::RetriesExhausted {
                    url: url.to_string(),
                    attempts: *attempts,
                    last_error,
                }
            }
        };
        debug_assert!(state.is_terminal());
        return Ok(event);
    }
}
