//! Blocking retrieval: poll the index for a named object under a bounded
//! retry/timeout policy.
//!
//! Polling is the correctness-preserving fallback when the producer of a tag
//! never goes through the subscription path: the retriever only depends on
//! the index, waking on the Tokio timer between attempts. The first lookup
//! always happens immediately, and a hit returns without any further wait.

use std::sync::Arc;
use std::time::Duration;

use tagreg_index::TagIndex;
use tagreg_protocol::{ObjectId, RegistryError, RegistryResult, RetryPolicy, fold_key};
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Polls [`TagIndex::find_by_name`] until a match, a timeout, or attempt
/// exhaustion. Never suspends while the index lock is held.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<TagIndex>,
    poll_interval: Duration,
}

impl Retriever {
    pub fn new(index: Arc<TagIndex>) -> Self {
        Self {
            index,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Wait for an object named `name` to appear under `tag`.
    ///
    /// Runs to completion once entered: found, `NotFoundTimeout`, or
    /// `NotFoundExhausted`. Argument-validation errors surface immediately
    /// without retrying.
    #[instrument(skip(self))]
    pub async fn retrieve(
        &self,
        tag: &str,
        name: &str,
        policy: RetryPolicy,
    ) -> RegistryResult<ObjectId> {
        let attempts = policy.effective_attempts();
        let started = Instant::now();

        for attempt in 1..=attempts {
            if let Some(found) = self.index.find_by_name(tag, name)? {
                debug!(attempt, "object retrieved");
                return Ok(found);
            }

            let elapsed = started.elapsed();
            if let Some(timeout) = policy.timeout
                && elapsed >= timeout
            {
                warn!(attempt, ?timeout, "retrieval timed out");
                return Err(RegistryError::NotFoundTimeout {
                    tag: fold_key(tag),
                    name: fold_key(name),
                    attempts: attempt,
                });
            }

            if attempt == attempts {
                break;
            }

            // Cap the wait at the remaining budget so the timeout check on
            // the next pass fires right at expiry, after one last lookup.
            let wait = match policy.timeout {
                Some(timeout) => self.poll_interval.min(timeout.saturating_sub(elapsed)),
                None => self.poll_interval,
            };
            sleep(wait).await;
        }

        warn!(attempts, "retrieval attempts exhausted");
        Err(RegistryError::NotFoundExhausted {
            tag: fold_key(tag),
            name: fold_key(name),
            attempts,
        })
    }
}
