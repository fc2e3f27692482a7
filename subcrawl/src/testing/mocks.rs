//! Scripted API backend for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::client::{CommunityApi, CommunityProfile, SearchHit};
use crate::errors::{ApiError, ApiResult};

#[derive(Debug)]
enum Failure {
    Always(ApiError),
    Times(VecDeque<ApiError>),
}

impl Failure {
    fn next(&mut self) -> Option<ApiError> {
        match self {
            Self::Always(error) => Some(error.clone()),
            Self::Times(queue) => queue.pop_front(),
        }
    }
}

/// A [`CommunityApi`] that answers from fixed tables.
///
/// Unknown search terms return no hits; unknown communities are
/// `NotFound`. Failures can be injected per term or name, either forever or
/// for the first N calls. Every call is counted.
#[derive(Debug, Default)]
pub struct ScriptedApi {
    searches: HashMap<String, Vec<SearchHit>>,
    profiles: HashMap<String, CommunityProfile>,
    search_failures: Mutex<HashMap<String, Failure>>,
    describe_failures: Mutex<HashMap<String, Failure>>,
    search_calls: Mutex<Vec<String>>,
    describe_calls: Mutex<Vec<String>>,
    latency: Option<Duration>,
}

impl ScriptedApi {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the hits for a search term.
    #[must_use]
    pub fn with_search<I, S>(mut self, term: &str, hits: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        self.searches.insert(
            term.to_string(),
            hits.into_iter().map(|(name, nsfw)| SearchHit::new(name, nsfw)).collect(),
        );
        self
    }

    /// Scripts a public community.
    #[must_use]
    pub fn with_profile(mut self, name: &str, nsfw: bool, description: &str) -> Self {
        self.profiles.insert(
            name.to_ascii_lowercase(),
            CommunityProfile::new(name, nsfw, description),
        );
        self
    }

    /// Scripts a private community.
    #[must_use]
    pub fn with_private(mut self, name: &str) -> Self {
        self.profiles.insert(
            name.to_ascii_lowercase(),
            CommunityProfile::new(name, false, "").private(),
        );
        self
    }

    /// Makes every search for `term` fail.
    #[must_use]
    pub fn failing_search(self, term: &str, error: ApiError) -> Self {
        self.search_failures
            .lock()
            .insert(term.to_string(), Failure::Always(error));
        self
    }

    /// Makes every describe of `name` fail.
    #[must_use]
    pub fn failing_describe(self, name: &str, error: ApiError) -> Self {
        self.describe_failures
            .lock()
            .insert(name.to_ascii_lowercase(), Failure::Always(error));
        self
    }

    /// Makes the first `times` describes of `name` fail.
    #[must_use]
    pub fn failing_describe_times(self, name: &str, error: ApiError, times: usize) -> Self {
        let queue = std::iter::repeat(error).take(times).collect();
        self.describe_failures
            .lock()
            .insert(name.to_ascii_lowercase(), Failure::Times(queue));
        self
    }

    /// Delays every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of searches for `term`.
    #[must_use]
    pub fn search_calls(&self, term: &str) -> usize {
        self.search_calls.lock().iter().filter(|t| *t == term).count()
    }

    /// Number of describes of `name`.
    #[must_use]
    pub fn describe_calls(&self, name: &str) -> usize {
        let name = name.to_ascii_lowercase();
        self.describe_calls.lock().iter().filter(|n| **n == name).count()
    }

    /// Every described name, in call order (retries repeat).
    #[must_use]
    pub fn described(&self) -> Vec<String> {
        self.describe_calls.lock().clone()
    }

    /// All calls made.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.search_calls.lock().len() + self.describe_calls.lock().len()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl CommunityApi for ScriptedApi {
    async fn search(&self, term: &str, limit: usize) -> ApiResult<Vec<SearchHit>> {
        self.search_calls.lock().push(term.to_string());
        self.pause().await;
        if let Some(error) = self.search_failures.lock().get_mut(term).and_then(Failure::next) {
            return Err(error);
        }
        Ok(self
            .searches
            .get(term)
            .map(|hits| hits.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn describe(&self, name: &str) -> ApiResult<CommunityProfile> {
        let key = name.to_ascii_lowercase();
        self.describe_calls.lock().push(key.clone());
        self.pause().await;
        if let Some(error) = self.describe_failures.lock().get_mut(&key).and_then(Failure::next) {
            return Err(error);
        }
        self.profiles
            .get(&key)
            .cloned()
            .ok_or_else(|| ApiError::not_found(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_answers_and_counts() {
        let api = ScriptedApi::new()
            .with_search("a", [("cats", false), ("dogs", false), ("apes", true)])
            .with_profile("cats", false, "r/dogs");

        assert_eq!(api.search("a", 2).await.unwrap().len(), 2);
        assert!(api.search("zzz", 10).await.unwrap().is_empty());
        assert_eq!(api.describe("Cats").await.unwrap().description, "r/dogs");
        assert!(matches!(api.describe("ghost").await, Err(ApiError::NotFound { .. })));

        assert_eq!(api.search_calls("a"), 1);
        assert_eq!(api.describe_calls("cats"), 1);
        assert_eq!(api.total_calls(), 4);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let api = ScriptedApi::new()
            .with_profile("cats", false, "")
            .failing_describe_times("cats", ApiError::transient("reset"), 2)
            .failing_search("a", ApiError::auth("bad"));

        assert!(api.describe("cats").await.is_err());
        assert!(api.describe("cats").await.is_err());
        assert!(api.describe("cats").await.is_ok());
        assert!(matches!(api.search("a", 10).await, Err(ApiError::Auth(_))));
        assert!(matches!(api.search("a", 10).await, Err(ApiError::Auth(_))));
    }
}
