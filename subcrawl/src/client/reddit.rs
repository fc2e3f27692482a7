//! Reddit backend for [`CommunityApi`].
//!
//! Authenticates with the OAuth2 client-credentials grant ("application
//! only") and reads two endpoints: `/subreddits/search` and `/r/{name}/about`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::api::{CommunityApi, CommunityProfile, SearchHit};
use crate::errors::{ApiError, ApiResult};

const DEFAULT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";
const DEFAULT_API_URL: &str = "https://oauth.reddit.com";
/// Tokens are refreshed this long before Reddit says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Credentials and endpoints for [`RedditClient`].
#[derive(Clone)]
pub struct RedditConfig {
    /// OAuth application id.
    pub client_id: String,
    /// OAuth application secret.
    pub client_secret: String,
    /// User agent sent with every request; Reddit throttles generic ones.
    pub user_agent: String,
    /// Token endpoint.
    pub auth_url: String,
    /// API base URL.
    pub api_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl RedditConfig {
    /// Creates a config pointing at the public Reddit endpoints.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            user_agent: user_agent.into(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Overrides both endpoints (tests, proxies).
    #[must_use]
    pub fn with_endpoints(mut self, auth_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self.api_url = api_url.into();
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for RedditConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("auth_url", &self.auth_url)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3_600
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    data: SubredditData,
}

#[derive(Debug, Deserialize)]
struct SubredditData {
    display_name: String,
    #[serde(default)]
    over18: bool,
    #[serde(default)]
    subreddit_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl SubredditData {
    fn into_profile(self) -> CommunityProfile {
        let public = self.subreddit_type.as_deref().map_or(true, |t| t == "public");
        let mut profile =
            CommunityProfile::new(self.display_name, self.over18, self.description.unwrap_or_default());
        profile.public = public;
        profile
    }
}

/// Reddit API backend.
pub struct RedditClient {
    http: reqwest::Client,
    config: RedditConfig,
    token: Mutex<Option<CachedToken>>,
}

impl RedditClient {
    /// Builds the HTTP client. No request is made until the first call.
    pub fn new(config: RedditConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::transient(format!("building http client: {e}")))?;
        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    async fn bearer(&self) -> ApiResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        debug!(url = %self.config.auth_url, "Requesting access token");
        let response = self
            .http
            .post(&self.config.auth_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(
                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    map_status(status, response.headers(), "access token")
                } else {
                    ApiError::auth(format!("token request rejected with {status}"))
                },
            );
        }

        let body: TokenResponse = response.json().await.map_err(transport_error)?;
        let lifetime = Duration::from_secs(body.expires_in);
        let value = body.access_token;
        *cached = Some(CachedToken {
            value: value.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        });
        Ok(value)
    }

    async fn get(&self, path: &str, query: &[(&str, String)], subject: &str) -> ApiResult<reqwest::Response> {
        let bearer = self.bearer().await?;
        let url = format!("{}{}", self.config.api_url.trim_end_matches('/'), path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&bearer)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(map_status(status, response.headers(), subject))
    }
}

impl std::fmt::Debug for RedditClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CommunityApi for RedditClient {
    async fn search(&self, term: &str, limit: usize) -> ApiResult<Vec<SearchHit>> {
        let query = [
            ("q", term.to_string()),
            ("limit", limit.to_string()),
            ("raw_json", "1".to_string()),
        ];
        let listing: Listing = self
            .get("/subreddits/search", &query, term)
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|thing| SearchHit::new(thing.data.display_name, thing.data.over18))
            .collect())
    }

    async fn describe(&self, name: &str) -> ApiResult<CommunityProfile> {
        let query = [("raw_json", "1".to_string())];
        let thing: Thing = self
            .get(&format!("/r/{name}/about"), &query, name)
            .await?
            .json()
            .await
            .map_err(transport_error)?;
        Ok(thing.data.into_profile())
    }
}

/// Maps a non-success HTTP status to an [`ApiError`].
pub(crate) fn map_status(status: StatusCode, headers: &HeaderMap, subject: &str) -> ApiError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited {
            retry_after: retry_after(headers),
        },
        StatusCode::UNAUTHORIZED => ApiError::auth(format!("{status} for {subject}")),
        StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => ApiError::not_found(subject),
        s if s.is_server_error() => ApiError::transient(format!("upstream returned {s}")),
        s => ApiError::transient(format!("unexpected status {s}")),
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[allow(clippy::needless_pass_by_value)]
fn transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::transient(format!("timed out: {error}"))
    } else if error.is_connect() {
        ApiError::transient(format!("connection failed: {error}"))
    } else if error.is_decode() {
        ApiError::transient(format!("malformed response: {error}"))
    } else {
        ApiError::transient(error.to_string())
    }
}
