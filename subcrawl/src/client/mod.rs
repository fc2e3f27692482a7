//! Upstream API access.
//!
//! This module provides:
//! - The [`CommunityApi`] trait, one raw call per method
//! - [`ApiClient`], which adds pacing, call budget, retry and cancellation
//! - [`RedditClient`], the real backend (feature `reddit`)

mod api;
mod rate_limit;
mod retry;

#[cfg(feature = "reddit")]
mod reddit;

pub use api::{CommunityApi, CommunityProfile, SearchHit};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::{should_retry, with_retry, BackoffConfig, JitterStrategy, RetryDecision, RetryState};

#[cfg(test)]
pub use api::MockCommunityApi;

#[cfg(feature = "reddit")]
pub use reddit::{RedditClient, RedditConfig};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::errors::ApiResult;

/// Resilient client used by the workers.
///
/// Every call, retries included, first takes a permit from the shared
/// [`RateLimiter`]; retryable failures back off per [`BackoffConfig`].
pub struct ApiClient {
    api: Arc<dyn CommunityApi>,
    limiter: Arc<RateLimiter>,
    backoff: BackoffConfig,
    token: Arc<CancellationToken>,
    search_limit: usize,
    retries: AtomicU64,
}

impl ApiClient {
    /// Creates a client over a backend.
    #[must_use]
    pub fn new(
        api: Arc<dyn CommunityApi>,
        limiter: Arc<RateLimiter>,
        backoff: BackoffConfig,
        token: Arc<CancellationToken>,
    ) -> Self {
        Self {
            api,
            limiter,
            backoff,
            token,
            search_limit: 10,
            retries: AtomicU64::new(0),
        }
    }

    /// Sets the per-search result limit.
    #[must_use]
    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    /// Searches communities matching `term`.
    pub async fn search(&self, term: &str) -> ApiResult<Vec<SearchHit>> {
        let limit = self.search_limit;
        with_retry(&self.backoff, &self.token, "search", |attempt| async move {
            self.admit(attempt).await?;
            self.api.search(term, limit).await
        })
        .await
    }

    /// Fetches the profile of `name`.
    pub async fn describe(&self, name: &str) -> ApiResult<CommunityProfile> {
        with_retry(&self.backoff, &self.token, "describe", |attempt| async move {
            self.admit(attempt).await?;
            self.api.describe(name).await
        })
        .await
    }

    async fn admit(&self, attempt: usize) -> ApiResult<()> {
        if attempt > 0 {
            self.retries.fetch_add(1, Ordering::Relaxed);
        }
        self.limiter.acquire(&self.token).await
    }

    /// Upstream calls admitted so far.
    #[must_use]
    pub fn calls_made(&self) -> u64 {
        self.limiter.calls_made()
    }

    /// Retries performed so far.
    #[must_use]
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// The shared limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("limiter", &self.limiter)
            .field("backoff", &self.backoff)
            .field("search_limit", &self.search_limit)
            .finish_non_exhaustive()
    }
}
