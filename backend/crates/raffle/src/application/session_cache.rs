//! Provider Client Cache
//!
//! Owns the single authenticated provider session shared by all requests.
//!
//! Reads go through an `RwLock` and are cheap once a session exists.
//! Replacing the session happens under a separate mutex, so only one
//! authentication is ever in flight; callers that queued behind it reuse its
//! outcome instead of authenticating again. A credential rejection is kept
//! for `auth_failure_cooldown`, during which callers fail fast.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::application::config::RaffleConfig;
use crate::domain::provider::{
    ContentProvider, ProviderCredentials, ProviderError, ProviderResult, ProviderSession,
};

struct FailedAttempt {
    at: Instant,
    error: ProviderError,
}

#[derive(Default)]
struct RefreshState {
    last_failure: Option<FailedAttempt>,
    authentications: u64,
}

/// Lazily authenticated, shared provider session
pub struct ProviderClientCache<P>
where
    P: ContentProvider,
{
    provider: Arc<P>,
    credentials: Arc<ProviderCredentials>,
    config: Arc<RaffleConfig>,
    session: RwLock<Option<Arc<ProviderSession>>>,
    refresh: Mutex<RefreshState>,
}

impl<P> ProviderClientCache<P>
where
    P: ContentProvider + Send + Sync + 'static,
{
    pub fn new(
        provider: Arc<P>,
        credentials: Arc<ProviderCredentials>,
        config: Arc<RaffleConfig>,
    ) -> Self {
        Self {
            provider,
            credentials,
            config,
            session: RwLock::new(None),
            refresh: Mutex::new(RefreshState::default()),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Current session, authenticating first when there is none usable
    pub async fn get_client(&self) -> ProviderResult<Arc<ProviderSession>> {
        if let Some(session) = self.current().await {
            return Ok(session);
        }

        let waiting_since = Instant::now();
        let mut refresh = self.refresh.lock().await;

        // Someone else may have refreshed while we queued
        if let Some(session) = self.current().await {
            return Ok(session);
        }

        if let Some(failure) = &refresh.last_failure {
            if failure.at >= waiting_since {
                return Err(failure.error.clone());
            }
            if matches!(failure.error, ProviderError::InvalidCredentials(_))
                && failure.at.elapsed() < self.config.auth_failure_cooldown
            {
                tracing::error!(
                    error = %failure.error,
                    "Provider credentials rejected recently; not retrying yet"
                );
                return Err(failure.error.clone());
            }
        }

        refresh.authentications += 1;
        match self.provider.authenticate(&self.credentials).await {
            Ok(session) => {
                let session = Arc::new(session);
                *self.session.write().await = Some(session.clone());
                refresh.last_failure = None;
                tracing::info!(
                    expires_at = %session.expires_at,
                    "Provider session established"
                );
                Ok(session)
            }
            Err(error) => {
                match &error {
                    ProviderError::InvalidCredentials(_) => {
                        tracing::error!(error = %error, "Provider rejected credentials");
                    }
                    _ => tracing::warn!(error = %error, "Provider authentication failed"),
                }
                refresh.last_failure = Some(FailedAttempt {
                    at: Instant::now(),
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Drop `stale` if it is still the current session
    ///
    /// A session that was already replaced by another request is left alone.
    pub async fn invalidate(&self, stale: &Arc<ProviderSession>) {
        let mut session = self.session.write().await;
        if session
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, stale))
        {
            *session = None;
            tracing::info!("Provider session invalidated");
        }
    }

    /// Number of authentication attempts made so far
    pub async fn authentications(&self) -> u64 {
        self.refresh.lock().await.authentications
    }

    async fn current(&self) -> Option<Arc<ProviderSession>> {
        let skew = self.config.token_expiry_skew_chrono();
        self.session
            .read()
            .await
            .as_ref()
            .filter(|s| s.is_usable(Utc::now(), skew))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::ProviderClientCache;
    use crate::application::config::RaffleConfig;
    use crate::domain::provider::{
        ContentProvider, ProviderCredentials, ProviderError, ProviderResult, ProviderSession,
        RawThread,
    };
    use crate::domain::value_objects::PostId;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Issues numbered tokens, optionally refusing credentials
    struct TokenIssuer {
        issued: AtomicU64,
        lifetime_secs: i64,
        reject: bool,
    }

    impl TokenIssuer {
        fn new(lifetime_secs: i64) -> Self {
            Self {
                issued: AtomicU64::new(0),
                lifetime_secs,
                reject: false,
            }
        }

        fn rejecting() -> Self {
            Self {
                reject: true,
                ..Self::new(3600)
            }
        }
    }

    impl ContentProvider for TokenIssuer {
        async fn authenticate(
            &self,
            _credentials: &ProviderCredentials,
        ) -> ProviderResult<ProviderSession> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if self.reject {
                return Err(ProviderError::InvalidCredentials("401".into()));
            }
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ProviderSession::new(
                format!("token-{n}"),
                Utc::now() + Duration::seconds(self.lifetime_secs),
            ))
        }

        async fn fetch_thread(
            &self,
            _session: &ProviderSession,
            _post_id: &PostId,
        ) -> ProviderResult<RawThread> {
            Err(ProviderError::NotFound)
        }
    }

    fn cache(issuer: TokenIssuer, config: RaffleConfig) -> Arc<ProviderClientCache<TokenIssuer>> {
        Arc::new(ProviderClientCache::new(
            Arc::new(issuer),
            Arc::new(ProviderCredentials::new("id", "secret", "ua")),
            Arc::new(config),
        ))
    }

    #[tokio::test]
    async fn test_session_is_reused() {
        let cache = cache(TokenIssuer::new(3600), RaffleConfig::default());

        let first = cache.get_client().await.unwrap();
        let second = cache.get_client().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.access_token.expose(), "token-1");
        assert_eq!(cache.authentications().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_authentication() {
        let cache = cache(TokenIssuer::new(3600), RaffleConfig::default());

        let mut handles = Vec::new();
        for _ in 0..20 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get_client().await.unwrap() }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().access_token.expose(), "token-1");
        }
        assert_eq!(cache.authentications().await, 1);
    }

    #[tokio::test]
    async fn test_expired_session_is_replaced() {
        // Lifetime shorter than the skew: never usable after issue
        let cache = cache(TokenIssuer::new(30), RaffleConfig::default());

        let first = cache.get_client().await.unwrap();
        let second = cache.get_client().await.unwrap();

        assert_eq!(first.access_token.expose(), "token-1");
        assert_eq!(second.access_token.expose(), "token-2");
    }

    #[tokio::test]
    async fn test_invalidate_only_drops_current_session() {
        let cache = cache(TokenIssuer::new(3600), RaffleConfig::default());

        let first = cache.get_client().await.unwrap();
        cache.invalidate(&first).await;
        let second = cache.get_client().await.unwrap();
        assert_eq!(second.access_token.expose(), "token-2");

        // A late invalidation with the old session keeps the new one
        cache.invalidate(&first).await;
        let third = cache.get_client().await.unwrap();
        assert!(Arc::ptr_eq(&second, &third));
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_fast_during_cooldown() {
        let cache = cache(TokenIssuer::rejecting(), RaffleConfig::default());

        let err = cache.get_client().await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidCredentials(_)));

        let err = cache.get_client().await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidCredentials(_)));
        assert_eq!(cache.authentications().await, 1);
    }

    #[tokio::test]
    async fn test_rejected_credentials_retried_after_cooldown() {
        let config = RaffleConfig {
            auth_failure_cooldown: std::time::Duration::ZERO,
            ..RaffleConfig::default()
        };
        let cache = cache(TokenIssuer::rejecting(), config);

        assert!(cache.get_client().await.is_err());
        assert!(cache.get_client().await.is_err());
        assert_eq!(cache.authentications().await, 2);
    }
}
