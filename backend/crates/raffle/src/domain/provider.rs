//! Content Provider Port
//!
//! Trait the application layer talks to for authentication and thread
//! retrieval, plus the raw shapes it returns. The Reddit implementation lives
//! in `infra::reddit`; tests substitute in-memory fakes.

use chrono::{DateTime, Duration, Utc};
use platform::secret::SecretString;
use thiserror::Error;

use crate::domain::value_objects::PostId;

/// User agent sent when none is configured
pub const DEFAULT_USER_AGENT: &str = "RedditRaffleTool/1.0";

/// Bodies the provider substitutes for deleted or moderated comments
pub const TOMBSTONE_MARKERS: &[&str] = &["[deleted]", "[removed]", "[removed by reddit]"];

/// Whether a comment body is a deletion placeholder
pub fn is_tombstone(body: &str) -> bool {
    let body = body.trim();
    TOMBSTONE_MARKERS
        .iter()
        .any(|marker| body.eq_ignore_ascii_case(marker))
}

/// Privileged credentials held only by the proxy
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub user_agent: String,
}

impl ProviderCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            user_agent: user_agent.into(),
        }
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// An authenticated provider session (application-only bearer token)
#[derive(Debug)]
pub struct ProviderSession {
    pub access_token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl ProviderSession {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            expires_at,
        }
    }

    /// Usable at `now` with at least `skew` of lifetime left
    pub fn is_usable(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now + skew < self.expires_at
    }
}

/// Post and top-level comments as the provider returned them
#[derive(Debug, Clone, PartialEq)]
pub struct RawThread {
    pub post: RawPost,
    /// Top-level comments in provider order
    pub comments: Vec<CommentNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawPost {
    pub id: String,
    pub title: String,
    /// `None` when the account was deleted
    pub author: Option<String>,
    pub created_utc: f64,
    pub selftext: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub id: String,
    pub author: Option<String>,
    pub body: String,
    pub created_utc: f64,
    pub score: i64,
    /// Fullname of the parent (`t3_` for top-level comments)
    pub parent_id: String,
    /// Direct replies; never read as entries
    pub replies: Vec<CommentNode>,
}

/// Provider failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider refused the proxy's credentials
    #[error("provider rejected credentials: {0}")]
    InvalidCredentials(String),

    /// The session was rejected mid-request
    #[error("provider session unauthorized")]
    Unauthorized,

    #[error("post not found")]
    NotFound,

    #[error("provider rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Response did not have the expected shape
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Content provider API
#[trait_variant::make(ContentProvider: Send)]
pub trait LocalContentProvider {
    /// Obtain a fresh session with the given credentials
    async fn authenticate(&self, credentials: &ProviderCredentials)
    -> ProviderResult<ProviderSession>;

    /// Fetch a post and its top-level comments, fully expanded
    async fn fetch_thread(
        &self,
        session: &ProviderSession,
        post_id: &PostId,
    ) -> ProviderResult<RawThread>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tombstones() {
        assert!(is_tombstone("[deleted]"));
        assert!(is_tombstone("[removed]"));
        assert!(is_tombstone(" [Removed by Reddit] "));
        assert!(!is_tombstone("I want 2 spots [deleted] later"));
        assert!(!is_tombstone(""));
    }

    #[test]
    fn test_session_usable_respects_skew() {
        let now = Utc::now();
        let session = ProviderSession::new("token", now + Duration::seconds(90));
        assert!(session.is_usable(now, Duration::seconds(60)));
        assert!(!session.is_usable(now + Duration::seconds(30), Duration::seconds(60)));
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let credentials = ProviderCredentials::new("id", "very-secret", DEFAULT_USER_AGENT);
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("RedditRaffleTool/1.0"));
    }
}
