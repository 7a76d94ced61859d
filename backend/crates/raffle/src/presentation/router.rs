//! Raffle Router

use axum::{
    Router,
    routing::{get, post},
};
use platform::rate_limit::{InMemoryRateLimitStore, RateLimitStore};

use crate::domain::provider::ContentProvider;
use crate::infra::reddit::RedditProvider;
use crate::presentation::handlers::{self, RaffleAppState};

/// Create the raffle router backed by Reddit and the in-memory limiter
pub fn raffle_router(state: RaffleAppState<RedditProvider, InMemoryRateLimitStore>) -> Router {
    raffle_router_generic(state)
}

/// Create a generic raffle router for any provider and limiter store
pub fn raffle_router_generic<P, S>(state: RaffleAppState<P, S>) -> Router
where
    P: ContentProvider + Send + Sync + 'static,
    S: RateLimitStore + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(
            "/api/post/comments",
            post(handlers::post_comments::<P, S>).fallback(handlers::method_not_allowed),
        )
        .fallback(handlers::not_found)
        .with_state(state)
}
