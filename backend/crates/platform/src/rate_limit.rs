//! Rate Limiting Infrastructure
//!
//! Common rate limiting abstractions and the in-memory sliding-log store.
//!
//! The sliding log keeps the instants of the last `max_requests` admitted
//! requests per key. A request is admitted only while fewer than
//! `max_requests` of those instants fall inside the trailing window, so at
//! most `max_requests` requests are admitted in *any* rolling window of
//! length `window`, including across what a fixed-window counter would
//! treat as a boundary.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

/// Rate limit check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    /// Requests still admissible in the current window
    pub remaining: u32,
    /// Time until the oldest counted request leaves the window
    pub retry_after: Duration,
}

impl RateLimitResult {
    fn admitted(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: Duration::ZERO,
        }
    }

    fn rejected(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after,
        }
    }

    /// `Retry-After` value in whole seconds, rounded up
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// Rate limit store failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit store lock poisoned")]
    Poisoned,
    #[error("rate limit backend error: {0}")]
    Backend(String),
}

/// Trait for rate limit storage backends
#[trait_variant::make(RateLimitStore: Send)]
pub trait LocalRateLimitStore {
    /// Check and increment rate limit counter as one atomic step
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitError>;

    /// Drop state for keys with no request inside the window
    ///
    /// Returns the number of keys evicted.
    async fn purge_idle(&self, config: &RateLimitConfig) -> Result<usize, RateLimitError>;
}

/// In-memory sliding-log store
///
/// The whole read-compare-increment sequence for a key runs under one mutex,
/// so concurrent requests for the same key can neither lose an update nor be
/// double counted. The critical section never awaits.
pub struct InMemoryRateLimitStore<C: Clock = SystemClock> {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    clock: C,
}

impl InMemoryRateLimitStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryRateLimitStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryRateLimitStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of keys currently holding window state
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().map(|w| w.len()).unwrap_or(0)
    }

    fn check_sync(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitError> {
        let now = self.clock.now();
        let mut windows = self.windows.lock().map_err(|_| RateLimitError::Poisoned)?;

        let log = windows.entry(key.to_string()).or_default();

        while let Some(&oldest) = log.front() {
            if now.duration_since(oldest) >= config.window {
                log.pop_front();
            } else {
                break;
            }
        }

        let used = log.len() as u32;
        if used >= config.max_requests {
            let retry_after = log
                .front()
                .map(|&oldest| config.window.saturating_sub(now.duration_since(oldest)))
                .unwrap_or(config.window);

            tracing::warn!(
                key = key,
                count = used,
                max = config.max_requests,
                "Rate limit exceeded"
            );

            return Ok(RateLimitResult::rejected(retry_after));
        }

        log.push_back(now);
        Ok(RateLimitResult::admitted(config.max_requests - used - 1))
    }

    fn purge_sync(&self, config: &RateLimitConfig) -> Result<usize, RateLimitError> {
        let now = self.clock.now();
        let mut windows = self.windows.lock().map_err(|_| RateLimitError::Poisoned)?;
        let before = windows.len();

        // A key is only dropped once its newest request has left the window,
        // i.e. it has nothing left to count.
        windows.retain(|_, log| {
            log.back()
                .is_some_and(|&newest| now.duration_since(newest) < config.window)
        });

        let evicted = before - windows.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = windows.len(), "Evicted idle rate limit keys");
        }
        Ok(evicted)
    }
}

impl<C: Clock> RateLimitStore for InMemoryRateLimitStore<C> {
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitError> {
        self.check_sync(key, config)
    }

    async fn purge_idle(&self, config: &RateLimitConfig) -> Result<usize, RateLimitError> {
        self.purge_sync(config)
    }
}
