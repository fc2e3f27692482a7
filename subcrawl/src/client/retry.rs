//! Retry utilities with exponential backoff and jitter.
//!
//! Only [`ApiError::is_retryable`] failures are retried. Every wait goes
//! through [`CancellationToken::sleep`] so an abort never sits out a full
//! backoff interval.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::cancellation::CancellationToken;
use crate::errors::{ApiError, ApiResult, CrawlError, Result};

/// Jitter strategy to prevent workers retrying in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    #[default]
    Equal,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Maximum calls per operation, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor applied per retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

fn default_max_attempts() -> usize {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: JitterStrategy::default(),
        }
    }
}

impl BackoffConfig {
    /// Creates a new backoff config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the growth factor.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Checks the policy is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(CrawlError::config("backoff.max_attempts must be at least 1"));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(CrawlError::config("backoff.multiplier must be >= 1.0"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(CrawlError::config(
                "backoff.max_delay_ms must not be below backoff.base_delay_ms",
            ));
        }
        Ok(())
    }
}

/// State tracking for one retried operation.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Calls made so far.
    pub attempt: usize,
}

impl RetryState {
    /// Creates a new retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay before the next call, given the failure that just happened.
    ///
    /// `attempt` is the number of calls already made, so the first retry uses
    /// `base_delay_ms`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn calculate_delay(&self, config: &BackoffConfig, hint: Option<Duration>) -> Duration {
        let max = config.max_delay_ms;
        let exponent = self.attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
        let raw = config.base_delay_ms as f64 * config.multiplier.powi(exponent);
        let delay = if raw.is_finite() && raw < max as f64 {
            raw as u64
        } else {
            max
        };

        let jittered = match config.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        // A server hint is a floor, never a reason to exceed the cap.
        let floor = hint.map_or(0, |h| u64::try_from(h.as_millis()).unwrap_or(u64::MAX));
        Duration::from_millis(jittered.max(floor).min(max))
    }

    /// Returns true if no calls remain.
    #[must_use]
    pub fn is_exhausted(&self, config: &BackoffConfig) -> bool {
        self.attempt >= config.max_attempts
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries, give up.
    GiveUp,
    /// Don't retry, the error is not retryable.
    NotRetryable,
}

/// Decides what to do after a failed call.
#[must_use]
pub fn should_retry(state: &RetryState, config: &BackoffConfig, error: &ApiError) -> RetryDecision {
    if !error.is_retryable() {
        return RetryDecision::NotRetryable;
    }
    if state.is_exhausted(config) {
        return RetryDecision::GiveUp;
    }
    RetryDecision::Retry(state.calculate_delay(config, error.retry_after()))
}

/// Executes an API operation with retry logic.
///
/// The operation receives the zero-based attempt index. Retryable failures
/// are retried until `max_attempts` calls have been made, after which
/// [`ApiError::RetriesExhausted`] is returned. Cancellation is checked before
/// every call and interrupts backoff sleeps.
pub async fn with_retry<T, F, Fut>(
    config: &BackoffConfig,
    token: &CancellationToken,
    label: &str,
    mut operation: F,
) -> ApiResult<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut state = RetryState::new();

    loop {
        if token.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let attempt = state.attempt;
        state.attempt += 1;

        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        match should_retry(&state, config, &error) {
            RetryDecision::Retry(delay) => {
                debug!(
                    call = %label,
                    attempt = state.attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "Retrying after error"
                );
                if !token.sleep(delay).await {
                    return Err(ApiError::Cancelled);
                }
            }
            RetryDecision::GiveUp => {
                return Err(ApiError::RetriesExhausted {
                    attempts: state.attempt,
                    last: Box::new(error),
                });
            }
            RetryDecision::NotRetryable => return Err(error),
        }
    }
}
