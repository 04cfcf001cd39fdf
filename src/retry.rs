//! Retry policy for batch ingestion loops.
//!
//! A failed batch item is retried after a fixed delay. By default the
//! retry is unbounded and every error counts as transient; a policy can opt
//! into skipping permanent (decode/identity) errors or capping attempts.
//!
//! The live session handle is threaded through each attempt so a session
//! replaced inside one attempt is the one the next attempt uses.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::IngestConfig;
use crate::error::{Error, Result};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay between attempts
    pub delay: Duration,
    /// Return permanent errors immediately instead of retrying
    pub skip_permanent: bool,
    /// Attempt cap; `None` retries until the item succeeds
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(60),
            skip_permanent: false,
            max_attempts: None,
        }
    }
}

impl From<&IngestConfig> for RetryPolicy {
    fn from(config: &IngestConfig) -> Self {
        Self {
            delay: Duration::from_secs(config.retry_delay_secs),
            skip_permanent: config.skip_permanent_errors,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    fn gives_up(&self, attempt: u32, error: &Error) -> bool {
        if self.skip_permanent && error.is_permanent() {
            return true;
        }
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

/// Run one batch item until it succeeds or the policy gives up.
///
/// `state` (usually the session handle) is moved into each attempt and
/// handed back with its result, so the caller always ends up holding the
/// live value.
pub async fn retry_item<S, T, F, Fut>(
    policy: &RetryPolicy,
    item: &str,
    mut state: S,
    mut operation: F,
) -> (S, Result<T>)
where
    F: FnMut(S) -> Fut,
    Fut: Future<Output = (S, Result<T>)>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let (next, result) = operation(state).await;
        state = next;

        match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded after {} attempts", item, attempt);
                }
                return (state, Ok(value));
            }
            Err(e) if policy.gives_up(attempt, &e) => {
                warn!(item, attempt, error = %e, "giving up on batch item");
                return (state, Err(e));
            }
            Err(e) => {
                warn!(
                    "{} failed (attempt {}): {}. Retrying in {:?}...",
                    item, attempt, e, policy.delay
                );
                sleep(policy.delay).await;
            }
        }
    }
}
