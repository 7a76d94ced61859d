//! Fetch Raffle Use Case
//!
//! The request pipeline: rate check, reference validation, provider fetch,
//! spot extraction, response.

use platform::client::ClientIdentity;
use platform::rate_limit::RateLimitStore;
use std::fmt;
use std::sync::Arc;

use crate::application::config::RaffleConfig;
use crate::application::fetch_post::PostFetcher;
use crate::application::rate_limiter::RateLimiter;
use crate::application::session_cache::ProviderClientCache;
use crate::domain::entities::RaffleResult;
use crate::domain::provider::ContentProvider;
use crate::error::{ProxyResult, RaffleError};

/// Message for a body without `post_url`
pub const MISSING_POST_URL: &str = "Missing post_url in request body";

/// Input DTO for the fetch raffle use case
#[derive(Debug, Clone, Default)]
pub struct FetchRaffleInput {
    pub post_url: Option<String>,
}

/// Stage of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    RateChecked,
    Fetching,
    Extracting,
    Responding,
    Done,
    Rejected,
    Failed(&'static str),
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestState::Received => f.write_str("received"),
            RequestState::RateChecked => f.write_str("rate_checked"),
            RequestState::Fetching => f.write_str("fetching"),
            RequestState::Extracting => f.write_str("extracting"),
            RequestState::Responding => f.write_str("responding"),
            RequestState::Done => f.write_str("done"),
            RequestState::Rejected => f.write_str("rejected"),
            RequestState::Failed(code) => write!(f, "failed({code})"),
        }
    }
}

fn enter(state: RequestState) {
    tracing::debug!(state = %state, "Request state");
}

/// Fetch Raffle Use Case
pub struct FetchRaffleUseCase<P, S>
where
    P: ContentProvider,
    S: RateLimitStore,
{
    limiter: Arc<RateLimiter<S>>,
    fetcher: PostFetcher<P>,
    config: Arc<RaffleConfig>,
}

impl<P, S> FetchRaffleUseCase<P, S>
where
    P: ContentProvider + Send + Sync + 'static,
    S: RateLimitStore + Send + Sync + 'static,
{
    pub fn new(
        cache: Arc<ProviderClientCache<P>>,
        limiter: Arc<RateLimiter<S>>,
        config: Arc<RaffleConfig>,
    ) -> Self {
        Self {
            limiter,
            fetcher: PostFetcher::new(cache, config.clone()),
            config,
        }
    }

    /// Run the pipeline for one caller
    pub async fn execute(
        &self,
        identity: &ClientIdentity,
        input: FetchRaffleInput,
    ) -> ProxyResult<RaffleResult> {
        enter(RequestState::Received);

        let result = self.run(identity, input).await;

        match &result {
            Ok(raffle) => {
                enter(RequestState::Done);
                tracing::info!(
                    url = %raffle.post.url,
                    comments = raffle.comments.len(),
                    total_spots = raffle.total_spots(),
                    "Raffle fetched"
                );
            }
            Err(RaffleError::RateLimited { .. }) => enter(RequestState::Rejected),
            Err(e) => enter(RequestState::Failed(e.code())),
        }

        result
    }

    async fn run(
        &self,
        identity: &ClientIdentity,
        input: FetchRaffleInput,
    ) -> ProxyResult<RaffleResult> {
        self.limiter.check(identity).await?;
        enter(RequestState::RateChecked);

        let raw_url = input
            .post_url
            .ok_or_else(|| RaffleError::InvalidRequest(MISSING_POST_URL.to_string()))?;
        let reference = self.fetcher.parse_reference(&raw_url)?;

        enter(RequestState::Fetching);
        let fetch = self.fetcher.retrieve(&reference);
        let thread = tokio::time::timeout(self.config.fetch_timeout, fetch)
            .await
            .map_err(|_| {
                RaffleError::ProviderUnavailable(format!(
                    "fetch of {} timed out after {:?}",
                    reference.post_id(),
                    self.config.fetch_timeout
                ))
            })??;

        enter(RequestState::Extracting);
        let raffle = self.fetcher.build_result(&reference, thread);

        enter(RequestState::Responding);
        Ok(raffle)
    }
}
