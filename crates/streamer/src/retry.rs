//! Retry with a time budget
//!
//! Every flush runs through [`retry_with_budget`]:
//!
//! ```text
//! attempt 1 ── immediately
//!   fail ──→ elapsed + delay > max_deadline_offset ? give up
//!            attempts exhausted ?                     give up
//!            sleep(delay); delay *= multiplier
//! attempt 2 ── ...
//! ```
//!
//! The ceiling is checked before sleeping, so no new attempt starts past it.
//! An attempt already running when the ceiling passes is allowed to finish.
//! Errors whose [`ContractError::is_retryable`] is false stop the loop at once.

use std::future::Future;
use std::time::Duration;

use contracts::{
    ContractError, RetryConfig, DEFAULT_INITIAL_RETRY_DELAY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_RETRY_DEADLINE_OFFSET, DEFAULT_RETRY_DELAY_MULTIPLIER,
};
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Retry policy applied to each flush operation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first; `None` is unlimited
    pub max_attempts: Option<u32>,
    /// Sleep before the second attempt
    pub initial_delay: Duration,
    /// Growth factor of the sleep after each failure
    pub multiplier: f64,
    /// Wall-clock ceiling measured from the first attempt
    pub max_deadline_offset: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            initial_delay: DEFAULT_INITIAL_RETRY_DELAY,
            multiplier: DEFAULT_RETRY_DELAY_MULTIPLIER,
            max_deadline_offset: DEFAULT_MAX_RETRY_DEADLINE_OFFSET,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: Option<u32>,
        initial_delay: Duration,
        multiplier: f64,
        max_deadline_offset: Duration,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier,
            max_deadline_offset,
        }
    }

    /// Policy that gives up after the first failure
    pub fn no_retry() -> Self {
        Self {
            max_attempts: Some(1),
            ..Self::default()
        }
    }

    /// Build from a retry section; zero fields take their defaults
    pub fn from_config(config: &RetryConfig) -> Self {
        let max_attempts = match config.max_attempts {
            0 => Some(DEFAULT_MAX_ATTEMPTS),
            _ => config.max_attempts(),
        };
        let initial_delay = if config.initial_delay_ms == 0 {
            DEFAULT_INITIAL_RETRY_DELAY
        } else {
            config.initial_delay()
        };

        Self::new(
            max_attempts,
            initial_delay,
            config.multiplier,
            config.max_deadline_offset(),
        )
        .normalized()
    }

    /// Replace invalid values with defaults
    ///
    /// - multiplier `<= 1` or non-finite -> default multiplier
    /// - `Some(0)` attempts -> one attempt
    /// - zero deadline -> default deadline
    pub fn normalized(mut self) -> Self {
        if !self.multiplier.is_finite() || self.multiplier <= 1.0 {
            self.multiplier = DEFAULT_RETRY_DELAY_MULTIPLIER;
        }
        if self.max_attempts == Some(0) {
            self.max_attempts = Some(1);
        }
        if self.max_deadline_offset.is_zero() {
            self.max_deadline_offset = DEFAULT_MAX_RETRY_DEADLINE_OFFSET;
        }
        self
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.multiplier).unwrap_or(Duration::MAX)
    }
}

/// Run `operation` until it succeeds or the policy's budget is spent
///
/// Returns the last error when giving up.
pub async fn retry_with_budget<F, Fut, T>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, ContractError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ContractError>>,
{
    let started = Instant::now();
    let mut delay = policy.initial_delay;
    let mut attempt: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);

        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            debug!(attempt, error = %err, "Non-retryable error, giving up");
            return Err(err);
        }

        if policy.max_attempts.is_some_and(|max| attempt >= max) {
            debug!(attempt, error = %err, "Retry attempts exhausted");
            return Err(err);
        }

        let resume_at = started.elapsed().saturating_add(delay);
        if resume_at > policy.max_deadline_offset {
            debug!(
                attempt,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %err,
                "Retry deadline reached"
            );
            return Err(err);
        }

        debug!(
            attempt,
            backoff_ms = delay.as_millis() as u64,
            error = %err,
            "Retryable error, backing off"
        );
        sleep(delay).await;
        delay = policy.next_delay(delay);
    }
}
