//! Infrastructure Layer
//!
//! Content provider implementations.

pub mod reddit;
