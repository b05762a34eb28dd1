//! Conflict retry controller
//!
//! Wraps one creation attempt. A name conflict asks for a fresh label and
//! tries again, with exponential backoff, up to a fixed number of attempts.
//! Any other error propagates untouched on the first occurrence.

use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::RetryConfig;
use crate::error::{E2eError, E2eResult};
use crate::orchestrator::{CreationOutcome, Created};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            multiplier: config.multiplier.max(1.0),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, given `attempt` (1-based) just failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exp);
        Duration::from_millis(millis as u64).min(self.max_backoff)
    }
}

/// Per-call retry bookkeeping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<String>,
}

pub struct ConflictRetryController {
    policy: RetryPolicy,
}

impl ConflictRetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `attempt` with `first_label`, then with labels from `next_label`
    /// after each conflict.
    pub async fn run<A, Fut, N>(
        &self,
        requested: &str,
        first_label: String,
        mut next_label: N,
        mut attempt: A,
    ) -> E2eResult<Created>
    where
        A: FnMut(String) -> Fut,
        Fut: Future<Output = E2eResult<CreationOutcome>>,
        N: FnMut() -> String,
    {
        let mut state = RetryState::default();
        let mut label = first_label;

        loop {
            state.attempt += 1;
            match attempt(label.clone()).await? {
                CreationOutcome::Succeeded(created) => {
                    if state.attempt > 1 {
                        info!(
                            "'{}' resolved as '{}' on attempt {}",
                            requested, created.label, state.attempt
                        );
                    }
                    return Ok(created);
                }
                CreationOutcome::ConflictDetected { label: rejected } => {
                    state.last_error = Some(
                        E2eError::ValidationConflict {
                            label: rejected.clone(),
                        }
                        .to_string(),
                    );

                    if state.attempt >= self.policy.max_attempts {
                        warn!(
                            "'{}' still conflicting after {} attempts; giving up",
                            requested, state.attempt
                        );
                        return Err(E2eError::ConflictRetriesExhausted {
                            requested: requested.to_string(),
                            attempts: state.attempt,
                            last_label: rejected,
                        });
                    }

                    let delay = self.policy.backoff(state.attempt);
                    warn!(
                        "Conflict on '{}' (attempt {}/{}), retrying in {:?}",
                        rejected, state.attempt, self.policy.max_attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                    label = next_label();
                }
            }
        }
    }
}
