//! Application Layer - Use Cases
//!
//! This layer orchestrates domain logic and infrastructure.
//! Contains use case implementations.

pub mod config;
pub mod fetch_post;
pub mod fetch_raffle;
pub mod rate_limiter;
pub mod session_cache;
