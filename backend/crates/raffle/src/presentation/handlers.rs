//! HTTP Handlers

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use kernel::error::app_error::AppError;
use kernel::id::RequestId;
use platform::client::ClientIdentity;
use platform::rate_limit::{InMemoryRateLimitStore, RateLimitStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::Instrument;

use crate::application::config::RaffleConfig;
use crate::application::fetch_raffle::{FetchRaffleInput, FetchRaffleUseCase};
use crate::application::rate_limiter::RateLimiter;
use crate::application::session_cache::ProviderClientCache;
use crate::domain::provider::{ContentProvider, ProviderCredentials};
use crate::error::RaffleError;
use crate::presentation::dto::{
    HealthResponse, PostCommentsRequest, PostCommentsResponse, ServiceInfo,
};

/// Correlation id header set on every raffle response
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared state for raffle handlers
pub struct RaffleAppState<P, S = InMemoryRateLimitStore>
where
    P: ContentProvider + Send + Sync + 'static,
    S: RateLimitStore + Send + Sync + 'static,
{
    pub cache: Arc<ProviderClientCache<P>>,
    pub limiter: Arc<RateLimiter<S>>,
    pub config: Arc<RaffleConfig>,
}

impl<P, S> RaffleAppState<P, S>
where
    P: ContentProvider + Send + Sync + 'static,
    S: RateLimitStore + Send + Sync + 'static,
{
    pub fn new(
        provider: P,
        credentials: ProviderCredentials,
        store: Arc<S>,
        config: RaffleConfig,
    ) -> Self {
        let config = Arc::new(config);
        let cache = ProviderClientCache::new(
            Arc::new(provider),
            Arc::new(credentials),
            config.clone(),
        );
        let limiter = RateLimiter::new(store, config.rate_limit_config());

        Self {
            cache: Arc::new(cache),
            limiter: Arc::new(limiter),
            config,
        }
    }
}

impl<P, S> Clone for RaffleAppState<P, S>
where
    P: ContentProvider + Send + Sync + 'static,
    S: RateLimitStore + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            limiter: self.limiter.clone(),
            config: self.config.clone(),
        }
    }
}

/// POST /api/post/comments
pub async fn post_comments<P, S>(
    State(state): State<RaffleAppState<P, S>>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Result<Json<PostCommentsRequest>, JsonRejection>,
) -> Response
where
    P: ContentProvider + Send + Sync + 'static,
    S: RateLimitStore + Send + Sync + 'static,
{
    let request_id = RequestId::new();
    let identity = ClientIdentity::from_request(
        &headers,
        Some(addr.ip()),
        &state.config.trusted_proxies,
    );
    let span = tracing::info_span!(
        "post_comments",
        request_id = %request_id,
        identity = %identity
    );

    let mut response = async {
        // Unparseable bodies are refused before they count against the limit
        let Json(request) = match body {
            Ok(body) => body,
            Err(rejection) => {
                tracing::debug!(error = %rejection, "Rejected request body");
                return RaffleError::InvalidRequest("Invalid JSON body".to_string())
                    .into_response();
            }
        };

        let use_case = FetchRaffleUseCase::new(
            state.cache.clone(),
            state.limiter.clone(),
            state.config.clone(),
        );
        let input = FetchRaffleInput {
            post_url: request.post_url,
        };

        match use_case.execute(&identity, input).await {
            Ok(result) => Json(PostCommentsResponse::from(result)).into_response(),
            Err(err) => err.into_response(),
        }
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// GET /health
///
/// Touches neither the limiter nor the provider session.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy(Utc::now()))
}

/// GET /
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Any other method on a known route
pub async fn method_not_allowed() -> RaffleError {
    RaffleError::MethodNotAllowed
}

/// Unknown route
pub async fn not_found() -> AppError {
    AppError::not_found("Not found")
}
