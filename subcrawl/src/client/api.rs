//! The raw upstream API boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ApiResult;

/// A community returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Display name as returned upstream.
    pub name: String,
    /// Whether the community is marked NSFW.
    pub nsfw: bool,
}

impl SearchHit {
    /// Creates a search hit.
    #[must_use]
    pub fn new(name: impl Into<String>, nsfw: bool) -> Self {
        Self {
            name: name.into(),
            nsfw,
        }
    }
}

/// The descriptive record of a single community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityProfile {
    /// Display name as returned upstream.
    pub name: String,
    /// Whether the community is marked NSFW.
    pub nsfw: bool,
    /// Whether the community is publicly readable.
    pub public: bool,
    /// Free-form description text mined for mentions.
    pub description: String,
}

impl CommunityProfile {
    /// Creates a public profile.
    #[must_use]
    pub fn new(name: impl Into<String>, nsfw: bool, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nsfw,
            public: true,
            description: description.into(),
        }
    }

    /// Marks the profile as private.
    #[must_use]
    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }
}

/// One upstream call per method, no retries and no pacing.
///
/// Implementations only translate transport results into [`ApiError`]
/// variants; [`ApiClient`](super::ApiClient) layers pacing, budget, retry and
/// cancellation on top.
///
/// [`ApiError`]: crate::errors::ApiError
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommunityApi: Send + Sync {
    /// Searches communities by free text.
    async fn search(&self, term: &str, limit: usize) -> ApiResult<Vec<SearchHit>>;

    /// Fetches a community's profile.
    async fn describe(&self, name: &str) -> ApiResult<CommunityProfile>;
}
