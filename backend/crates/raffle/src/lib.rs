//! Raffle Proxy Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, spot extraction, provider port
//! - `application/` - Use cases (rate limiting, session cache, fetch)
//! - `infra/` - Reddit API client
//! - `presentation/` - HTTP handlers
//!
//! ## Security Model
//! - Provider credentials live only in the proxy and never reach a response or a log line
//! - Every inbound call passes the per-client rate limiter before any provider traffic
//! - Post URLs are validated locally before any network call
//! - Spot counts are always derived from comment text, never trusted from the provider

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::config::RaffleConfig;
pub use domain::provider::{DEFAULT_USER_AGENT, ProviderCredentials};
pub use error::{ProxyResult, RaffleError};
pub use infra::reddit::RedditProvider;
pub use presentation::handlers::RaffleAppState;
pub use presentation::router::{raffle_router, raffle_router_generic};
