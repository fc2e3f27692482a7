//! Error types for the discovery engine.
//!
//! Upstream failures are classified by [`ApiError`] so the retry layer and the
//! worker pool can decide between retrying, skipping a task, and aborting the
//! whole run. Everything else surfaces as a [`CrawlError`].

use std::time::Duration;
use thiserror::Error;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result alias for upstream API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// The main error type for crawl operations.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// An upstream API call failed.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// A community name was empty or contained characters that are never part of a name.
    #[error("Malformed community name: {name:?}")]
    MalformedName {
        /// The rejected input.
        name: String,
    },

    /// The configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The run was cancelled.
    #[error("Crawl cancelled: {0}")]
    Cancelled(String),

    /// A worker task ended abnormally.
    #[error("Worker task failed: {0}")]
    Task(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    /// Creates a malformed name error.
    #[must_use]
    pub fn malformed(name: impl Into<String>) -> Self {
        Self::MalformedName { name: name.into() }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error must stop the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Api(err) => err.is_fatal(),
            Self::MalformedName { .. } => false,
            _ => true,
        }
    }
}

/// Failures reported by the upstream search/describe API.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The upstream asked us to slow down.
    #[error("Rate limited by upstream{}", .retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited {
        /// Server-provided wait hint, if any.
        retry_after: Option<Duration>,
    },

    /// A network or server failure that may succeed on retry.
    #[error("Transient network error: {0}")]
    Transient(String),

    /// The community does not exist or is not accessible.
    #[error("Community not found: {name}")]
    NotFound {
        /// The requested name.
        name: String,
    },

    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The run-wide call budget has been spent.
    #[error("API call budget of {limit} calls exhausted")]
    CallBudgetExhausted {
        /// The configured budget.
        limit: u64,
    },

    /// A retryable failure persisted through every allowed attempt.
    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of calls made.
        attempts: usize,
        /// The failure from the final attempt.
        last: Box<ApiError>,
    },

    /// The call was abandoned because the run was cancelled.
    #[error("API call cancelled")]
    Cancelled,
}

impl ApiError {
    /// Creates a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Whether the retry layer should try again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }

    /// Whether this error aborts the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Server-provided wait hint, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Short machine-friendly label used in logs and counters.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Transient(_) => "transient",
            Self::NotFound { .. } => "not_found",
            Self::Auth(_) => "auth",
            Self::CallBudgetExhausted { .. } => "call_budget_exhausted",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ApiError::RateLimited { retry_after: None }.is_retryable());
        assert!(ApiError::transient("reset").is_retryable());
        assert!(!ApiError::not_found("cats").is_retryable());
        assert!(!ApiError::auth("bad secret").is_retryable());
        assert!(!ApiError::Cancelled.is_retryable());
    }

    #[test]
    fn test_only_auth_is_fatal() {
        assert!(ApiError::auth("bad secret").is_fatal());
        assert!(!ApiError::CallBudgetExhausted { limit: 10 }.is_fatal());
        assert!(CrawlError::from(ApiError::auth("x")).is_fatal());
        assert!(!CrawlError::from(ApiError::not_found("x")).is_fatal());
        assert!(!CrawlError::malformed("").is_fatal());
    }

    #[test]
    fn test_rate_limited_message_includes_hint() {
        let err = ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.to_string(), "Rate limited by upstream (retry after 7s)");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_retries_exhausted_wraps_last_error() {
        let err = ApiError::RetriesExhausted {
            attempts: 4,
            last: Box::new(ApiError::transient("connection reset")),
        };
        assert!(err.to_string().contains("4 attempts"));
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(err.kind(), "retries_exhausted");
    }
}
