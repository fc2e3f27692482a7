//! Run configuration for the discovery engine.
//!
//! The engine receives a [`CrawlerConfig`] once, at pool construction, and
//! never re-reads it. Loading values from the environment or a file is the
//! host's job.

use serde::{Deserialize, Serialize};

use crate::client::{BackoffConfig, RateLimitConfig};
use crate::errors::{CrawlError, Result};

/// Configuration for one crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Longest generated seed term (`a`..`z`, `aa`..`zz`, ...).
    #[serde(default = "default_search_term_length")]
    pub search_term_length: usize,
    /// Explicit seed terms; replaces the generated ones when set.
    #[serde(default)]
    pub seed_terms: Option<Vec<String>>,
    /// Maximum results requested per search call.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Stop after this many communities have been confirmed.
    #[serde(default)]
    pub max_communities: Option<usize>,
    /// Stop after this many upstream calls (retries included).
    #[serde(default)]
    pub max_api_calls: Option<u64>,
    /// Queue depth at which workers stop taking new seed terms.
    #[serde(default = "default_queue_high_watermark")]
    pub queue_high_watermark: usize,
    /// Re-describe confirmed communities restored from a snapshot.
    #[serde(default)]
    pub rescan_on_rediscovery: bool,
    /// Retry/backoff policy for recoverable API failures.
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Client-side pacing; `None` disables pacing entirely.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: Option<RateLimitConfig>,
}

fn default_workers() -> usize {
    3
}

fn default_search_term_length() -> usize {
    1
}

fn default_search_limit() -> usize {
    10
}

fn default_queue_high_watermark() -> usize {
    1_000
}

#[allow(clippy::unnecessary_wraps)]
fn default_rate_limit() -> Option<RateLimitConfig> {
    Some(RateLimitConfig::default())
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            search_term_length: default_search_term_length(),
            seed_terms: None,
            search_limit: default_search_limit(),
            max_communities: None,
            max_api_calls: None,
            queue_high_watermark: default_queue_high_watermark(),
            rescan_on_rediscovery: false,
            backoff: BackoffConfig::default(),
            rate_limit: default_rate_limit(),
        }
    }
}

impl CrawlerConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the generated seed term length.
    #[must_use]
    pub fn with_search_term_length(mut self, length: usize) -> Self {
        self.search_term_length = length;
        self
    }

    /// Uses explicit seed terms instead of generated ones.
    #[must_use]
    pub fn with_seed_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_terms = Some(terms.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the per-search result limit.
    #[must_use]
    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    /// Caps the number of confirmed communities.
    #[must_use]
    pub fn with_max_communities(mut self, max: usize) -> Self {
        self.max_communities = Some(max);
        self
    }

    /// Caps the number of upstream calls.
    #[must_use]
    pub fn with_max_api_calls(mut self, max: u64) -> Self {
        self.max_api_calls = Some(max);
        self
    }

    /// Sets the queue high watermark.
    #[must_use]
    pub fn with_queue_high_watermark(mut self, depth: usize) -> Self {
        self.queue_high_watermark = depth;
        self
    }

    /// Enables or disables rescanning restored communities.
    #[must_use]
    pub fn with_rescan_on_rediscovery(mut self, rescan: bool) -> Self {
        self.rescan_on_rediscovery = rescan;
        self
    }

    /// Sets the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets (or disables, with `None`) client-side pacing.
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: Option<RateLimitConfig>) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Checks that the configuration can drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(CrawlError::config("workers must be at least 1"));
        }
        if self.search_limit == 0 {
            return Err(CrawlError::config("search_limit must be at least 1"));
        }
        match &self.seed_terms {
            Some(terms) if terms.iter().all(|t| t.trim().is_empty()) => {
                return Err(CrawlError::config("no seed terms supplied"));
            }
            None if self.search_term_length == 0 => {
                return Err(CrawlError::config("search_term_length must be at least 1"));
            }
            _ => {}
        }
        if self.max_communities == Some(0) {
            return Err(CrawlError::config("max_communities must be at least 1"));
        }
        if self.queue_high_watermark == 0 {
            return Err(CrawlError::config("queue_high_watermark must be at least 1"));
        }
        self.backoff.validate()?;
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CrawlerConfig::default();
        assert_eq!(config.workers, 3);
        assert_eq!(config.search_term_length, 1);
        assert_eq!(config.search_limit, 10);
        assert!(config.rate_limit.is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = CrawlerConfig::new()
            .with_workers(8)
            .with_seed_terms(["cats", "dogs"])
            .with_max_communities(50)
            .with_max_api_calls(500)
            .with_rescan_on_rediscovery(true)
            .with_rate_limit(None);

        assert_eq!(config.workers, 8);
        assert_eq!(config.seed_terms, Some(vec!["cats".to_string(), "dogs".to_string()]));
        assert_eq!(config.max_communities, Some(50));
        assert_eq!(config.max_api_calls, Some(500));
        assert!(config.rescan_on_rediscovery);
        assert!(config.rate_limit.is_none());
    }

    #[test]
    fn test_validate_rejects_unusable_values() {
        assert!(CrawlerConfig::new().with_workers(0).validate().is_err());
        assert!(CrawlerConfig::new().with_search_limit(0).validate().is_err());
        assert!(CrawlerConfig::new().with_search_term_length(0).validate().is_err());
        assert!(CrawlerConfig::new().with_seed_terms(["  "]).validate().is_err());
        assert!(CrawlerConfig::new().with_max_communities(0).validate().is_err());
    }

    #[test]
    fn test_explicit_seeds_ignore_term_length() {
        let config = CrawlerConfig::new()
            .with_search_term_length(0)
            .with_seed_terms(["a"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: CrawlerConfig =
            serde_json::from_str(r#"{"workers": 5, "max_communities": 20}"#).unwrap();
        assert_eq!(config.workers, 5);
        assert_eq!(config.max_communities, Some(20));
        assert_eq!(config.search_limit, 10);
        assert_eq!(config.backoff.max_attempts, BackoffConfig::default().max_attempts);
    }
}
