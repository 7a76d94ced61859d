//! Rate Limiter
//!
//! Gate in front of every provider call, keyed by client identity.

use platform::client::ClientIdentity;
use platform::rate_limit::{RateLimitConfig, RateLimitResult, RateLimitStore};
use std::sync::Arc;

use crate::error::{ProxyResult, RaffleError};

/// Per-identity request limiter over a pluggable store
pub struct RateLimiter<S>
where
    S: RateLimitStore,
{
    store: Arc<S>,
    config: RateLimitConfig,
}

impl<S> RateLimiter<S>
where
    S: RateLimitStore + Send + Sync + 'static,
{
    pub fn new(store: Arc<S>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Count one request for `identity`; `false` once over the limit
    ///
    /// A store failure denies the request.
    pub async fn allow(&self, identity: &ClientIdentity) -> bool {
        self.check(identity).await.is_ok()
    }

    /// Count one request, rejecting with `RateLimited` over the limit
    pub async fn check(&self, identity: &ClientIdentity) -> ProxyResult<RateLimitResult> {
        let result = self
            .store
            .check_and_increment(&identity.key(), &self.config)
            .await
            .map_err(|e| RaffleError::Internal(e.to_string()))?;

        if !result.allowed {
            return Err(RaffleError::RateLimited {
                retry_after_secs: result.retry_after_secs(),
            });
        }

        tracing::debug!(
            identity = %identity,
            remaining = result.remaining,
            "Rate limit check passed"
        );
        Ok(result)
    }

    /// Evict identities with no request left in the window
    pub async fn purge_idle(&self) -> usize {
        match self.store.purge_idle(&self.config).await {
            Ok(evicted) => evicted,
            Err(e) => {
                tracing::warn!(error = %e, "Rate limit eviction failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RateLimiter;
    use crate::error::RaffleError;
    use platform::client::ClientIdentity;
    use platform::clock::ManualClock;
    use platform::rate_limit::{InMemoryRateLimitStore, RateLimitConfig};
    use std::sync::Arc;
    use std::time::Duration;

    fn limiter(max: u32) -> (RateLimiter<InMemoryRateLimitStore<ManualClock>>, ManualClock) {
        let clock = ManualClock::default();
        let store = Arc::new(InMemoryRateLimitStore::with_clock(clock.clone()));
        (RateLimiter::new(store, RateLimitConfig::new(max, 60)), clock)
    }

    fn identity(ip: &str) -> ClientIdentity {
        ClientIdentity::new(Some(ip.parse().unwrap()))
    }

    #[tokio::test]
    async fn test_allow_n_then_reject_then_recover() {
        let (limiter, clock) = limiter(10);
        let client = identity("198.51.100.7");

        for _ in 0..10 {
            assert!(limiter.allow(&client).await);
        }
        assert!(!limiter.allow(&client).await);

        clock.advance(Duration::from_secs(60));
        assert!(limiter.allow(&client).await);
    }

    #[tokio::test]
    async fn test_check_reports_retry_after() {
        let (limiter, clock) = limiter(1);
        let client = identity("198.51.100.7");

        limiter.check(&client).await.unwrap();
        clock.advance(Duration::from_millis(20_500));

        match limiter.check(&client).await {
            Err(RaffleError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 40),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_purge_idle_evicts_quiet_identities() {
        let (limiter, clock) = limiter(5);
        limiter.allow(&identity("198.51.100.1")).await;
        limiter.allow(&identity("198.51.100.2")).await;

        clock.advance(Duration::from_secs(61));
        assert_eq!(limiter.purge_idle().await, 2);
    }
}
