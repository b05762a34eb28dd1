//! Generic "wait until a condition holds" primitive
//!
//! Decoupled from any driver: the check is an arbitrary async closure, so the
//! loop can be exercised against a fake state source. Uses tokio's clock, so
//! paused-time tests run instantly.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::error::E2eResult;

/// Result of a polling loop. A timeout is a value here, not an error:
/// callers decide what it means and must not drop it silently.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum Polled<T> {
    Ready { value: T, attempts: u32, elapsed: Duration },
    TimedOut { attempts: u32, elapsed: Duration },
}

impl<T> Polled<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Polled::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Polled::Ready { attempts, .. } | Polled::TimedOut { attempts, .. } => *attempts,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Polled::Ready { value, .. } => Some(value),
            Polled::TimedOut { .. } => None,
        }
    }
}

/// Evaluate `check` every `interval` until it yields `Some` or `timeout`
/// elapses. The check always runs at least once, and once more at the
/// deadline. Check errors abort the loop.
pub async fn poll_until<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> E2eResult<Polled<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<Option<T>>>,
{
    let start = Instant::now();
    let deadline = start + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Some(value) = check().await? {
            return Ok(Polled::Ready {
                value,
                attempts,
                elapsed: start.elapsed(),
            });
        }

        let now = Instant::now();
        if now >= deadline {
            trace!("poll timed out after {} attempts", attempts);
            return Ok(Polled::TimedOut {
                attempts,
                elapsed: start.elapsed(),
            });
        }
        sleep(interval.min(deadline - now)).await;
    }
}

/// Boolean form of [`poll_until`].
pub async fn wait_until<F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut predicate: F,
) -> E2eResult<Polled<()>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<bool>>,
{
    poll_until(timeout, interval, || {
        let fut = predicate();
        async move { Ok(fut.await?.then_some(())) }
    })
    .await
}
