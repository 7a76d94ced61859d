//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Client identification (rate-limit keys)
//! - Rate limiting abstractions and the in-memory sliding-log store
//! - Clocks (system and manually driven)
//! - Zeroized secret strings for provider credentials

pub mod client;
pub mod clock;
pub mod rate_limit;
pub mod secret;
