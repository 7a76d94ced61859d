//! Domain Layer - Business logic and entities
//!
//! This layer contains:
//! - Domain entities (Post, CommentEntry, RaffleResult)
//! - Domain value objects (PostId, PostReference)
//! - Spot extraction rules
//! - Host removal notices
//! - The content provider port

pub mod entities;
pub mod provider;
pub mod removals;
pub mod spots;
pub mod value_objects;
