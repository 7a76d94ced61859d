//! Application Configuration
//!
//! Configuration for the raffle application layer. Credentials are not part
//! of it; they travel separately as `ProviderCredentials`.

use platform::rate_limit::RateLimitConfig;
use std::net::IpAddr;
use std::time::Duration;

/// Raffle application configuration
#[derive(Debug, Clone)]
pub struct RaffleConfig {
    /// Rate limit: max requests per window
    pub rate_limit_max_requests: u32,
    /// Rate limit window
    pub rate_limit_window: Duration,
    /// Upper bound for the whole provider fetch of one request
    pub fetch_timeout: Duration,
    /// A session is renewed this long before the provider's stated expiry
    pub token_expiry_skew: Duration,
    /// How long a credential rejection is remembered before retrying
    pub auth_failure_cooldown: Duration,
    /// Provider comment sort order
    pub comment_sort: String,
    /// Top-level comments requested per page
    pub comment_limit: u32,
    /// Comment ids per more-children expansion call
    pub more_children_batch: usize,
    /// Accounts whose comments are never entries (case-insensitive)
    pub ignored_authors: Vec<String>,
    /// Skip comments written by the post author
    pub exclude_post_author: bool,
    /// Reverse proxies whose X-Forwarded-For is believed; empty means the
    /// TCP peer is always the client
    pub trusted_proxies: Vec<IpAddr>,
    /// Base URL of the token endpoint host
    pub auth_base_url: String,
    /// Base URL of the authenticated API host
    pub api_base_url: String,
}

impl Default for RaffleConfig {
    fn default() -> Self {
        Self {
            rate_limit_max_requests: 10,
            rate_limit_window: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(30),
            token_expiry_skew: Duration::from_secs(60),
            auth_failure_cooldown: Duration::from_secs(60),
            comment_sort: "old".to_string(),
            comment_limit: 500,
            more_children_batch: 100,
            ignored_authors: vec![
                "BotAndHisBoy".to_string(),
                "WatchURaffle".to_string(),
                "raffle_verification".to_string(),
            ],
            exclude_post_author: true,
            trusted_proxies: Vec::new(),
            auth_base_url: "https://www.reddit.com".to_string(),
            api_base_url: "https://oauth.reddit.com".to_string(),
        }
    }
}

impl RaffleConfig {
    /// Create config for development (generous rate limit, short cool-down)
    pub fn development() -> Self {
        Self {
            rate_limit_max_requests: 100,
            auth_failure_cooldown: Duration::from_secs(5),
            ..Default::default()
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.rate_limit_max_requests,
            window: self.rate_limit_window,
        }
    }

    pub fn is_ignored_author(&self, author: &str) -> bool {
        self.ignored_authors
            .iter()
            .any(|ignored| ignored.eq_ignore_ascii_case(author))
    }

    pub fn token_expiry_skew_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.token_expiry_skew).unwrap_or(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RaffleConfig::default();
        assert_eq!(config.rate_limit_config(), RateLimitConfig::new(10, 60));
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.comment_sort, "old");
        assert!(config.exclude_post_author);
        assert!(config.trusted_proxies.is_empty());
        assert_eq!(config.token_expiry_skew_chrono(), chrono::Duration::seconds(60));
    }

    #[test]
    fn test_ignored_authors_case_insensitive() {
        let config = RaffleConfig::default();
        assert!(config.is_ignored_author("watchuraffle"));
        assert!(config.is_ignored_author("BotAndHisBoy"));
        assert!(!config.is_ignored_author("regular_user"));
    }
}
