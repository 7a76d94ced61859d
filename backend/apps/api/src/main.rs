//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors; request-level errors are rendered by
//! the raffle crate through `kernel::error::AppError`.

use anyhow::Context;
use axum::http::{self, Method, header};
use platform::rate_limit::InMemoryRateLimitStore;
use raffle::{
    DEFAULT_USER_AGENT, ProviderCredentials, RaffleAppState, RaffleConfig, RedditProvider,
    raffle_router,
};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 8000;

/// Interval between sweeps of idle rate limit identities
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "api=info,raffle=info,platform=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Provider credentials
    let credentials = ProviderCredentials::new(
        required_var("REDDIT_CLIENT_ID")?,
        required_var("REDDIT_CLIENT_SECRET")?,
        env::var("REDDIT_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
    );

    // Raffle configuration
    let defaults = RaffleConfig::default();
    let config = RaffleConfig {
        rate_limit_max_requests: parsed_var("RATE_LIMIT_MAX_REQUESTS")?
            .unwrap_or(defaults.rate_limit_max_requests),
        rate_limit_window: parsed_var("RATE_LIMIT_WINDOW_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.rate_limit_window),
        fetch_timeout: parsed_var("FETCH_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.fetch_timeout),
        trusted_proxies: trusted_proxies()?,
        ..defaults
    };

    tracing::info!(
        max_requests = config.rate_limit_max_requests,
        window_secs = config.rate_limit_window.as_secs(),
        fetch_timeout_secs = config.fetch_timeout.as_secs(),
        trusted_proxies = config.trusted_proxies.len(),
        user_agent = %credentials.user_agent,
        "Raffle proxy configured"
    );

    let provider = RedditProvider::new(&config, &credentials.user_agent)
        .context("failed to build provider HTTP client")?;
    let store = Arc::new(InMemoryRateLimitStore::new());
    let state = RaffleAppState::new(provider, credentials, store, config);

    // Periodic eviction of idle rate limit identities
    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            interval.tick().await;
            let evicted = limiter.purge_idle().await;
            if evicted > 0 {
                tracing::debug!(evicted, "Rate limit eviction completed");
            }
        }
    });

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([Method::GET, Method::POST, Method::OPTIONS]))
        .allow_headers(AllowHeaders::list([header::CONTENT_TYPE, header::ACCEPT]));

    // Build router
    let app = raffle_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let port = parsed_var("PORT")?.unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn required_var(name: &str) -> anyhow::Result<String> {
    let value = env::var(name).with_context(|| format!("{name} must be set in environment"))?;
    if value.trim().is_empty() {
        anyhow::bail!("{name} must not be empty");
    }
    Ok(value)
}

/// Comma separated proxy addresses allowed to set X-Forwarded-For
fn trusted_proxies() -> anyhow::Result<Vec<IpAddr>> {
    let Ok(raw) = env::var("TRUSTED_PROXIES") else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse()
                .with_context(|| format!("TRUSTED_PROXIES has an invalid address: {entry:?}"))
        })
        .collect()
}

fn parsed_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} has an invalid value: {raw:?}")),
        Err(_) => Ok(None),
    }
}
