//! Run-wide pacing and call budget for the upstream API.
//!
//! One [`RateLimiter`] is created per run and shared (behind an `Arc`) by
//! every worker through the [`ApiClient`](super::ApiClient). Pacing uses a
//! GCRA token bucket from `governor`; the call budget is a plain atomic
//! counter.

use governor::{DefaultDirectRateLimiter, Quota};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cancellation::CancellationToken;
use crate::errors::{ApiError, ApiResult, CrawlError, Result};

/// Client-side pacing for the upstream API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained calls per minute across all workers.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Calls allowed back-to-back before pacing kicks in.
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_burst() -> u32 {
    5
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            burst: default_burst(),
        }
    }
}

impl RateLimitConfig {
    /// Creates a pacing config.
    #[must_use]
    pub fn new(requests_per_minute: u32, burst: u32) -> Self {
        Self {
            requests_per_minute,
            burst,
        }
    }

    /// Checks both values are non-zero.
    pub fn validate(&self) -> Result<()> {
        self.quota().map(|_| ())
    }

    fn quota(&self) -> Result<Quota> {
        let rate = NonZeroU32::new(self.requests_per_minute)
            .ok_or_else(|| CrawlError::config("rate_limit.requests_per_minute must be > 0"))?;
        let burst = NonZeroU32::new(self.burst)
            .ok_or_else(|| CrawlError::config("rate_limit.burst must be > 0"))?;
        Ok(Quota::per_minute(rate).allow_burst(burst))
    }
}

/// Shared pacing state and call budget for one run.
pub struct RateLimiter {
    limiter: Option<DefaultDirectRateLimiter>,
    budget: Option<u64>,
    calls: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter; `pacing: None` disables pacing, `budget: None` disables the cap.
    pub fn new(pacing: Option<&RateLimitConfig>, budget: Option<u64>) -> Result<Self> {
        let limiter = pacing
            .map(|config| config.quota().map(DefaultDirectRateLimiter::direct))
            .transpose()?;
        Ok(Self {
            limiter,
            budget,
            calls: AtomicU64::new(0),
        })
    }

    /// A limiter that never waits and never runs out.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            limiter: None,
            budget: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Waits for a pacing permit and consumes one unit of the call budget.
    ///
    /// Fails fast with [`ApiError::CallBudgetExhausted`] once the budget is
    /// spent, and with [`ApiError::Cancelled`] if the token fires while
    /// waiting.
    pub async fn acquire(&self, token: &CancellationToken) -> ApiResult<()> {
        if let Some(limit) = self.budget {
            if self.calls.load(Ordering::SeqCst) >= limit {
                return Err(ApiError::CallBudgetExhausted { limit });
            }
        }

        if let Some(limiter) = &self.limiter {
            tokio::select! {
                () = limiter.until_ready() => {}
                () = token.cancelled() => return Err(ApiError::Cancelled),
            }
        }

        match self.budget {
            Some(limit) => self
                .calls
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                    (c < limit).then_some(c + 1)
                })
                .map(|_| ())
                .map_err(|_| ApiError::CallBudgetExhausted { limit }),
            None => {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    /// Calls admitted so far.
    #[must_use]
    pub fn calls_made(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls left in the budget, if one is set.
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        self.budget
            .map(|limit| limit.saturating_sub(self.calls_made()))
    }

    /// Whether pacing is active.
    #[must_use]
    pub fn is_paced(&self) -> bool {
        self.limiter.is_some()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("paced", &self.is_paced())
            .field("budget", &self.budget)
            .field("calls", &self.calls_made())
            .finish()
    }
}
