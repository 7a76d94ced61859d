//! API DTOs (Data Transfer Objects)

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::{CommentEntry, RaffleResult};

/// Request for POST /api/post/comments
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostCommentsRequest {
    #[serde(default)]
    pub post_url: Option<String>,
}

/// Response for POST /api/post/comments
#[derive(Debug, Clone, Serialize)]
pub struct PostCommentsResponse {
    pub title: String,
    pub author: String,
    pub created_utc: i64,
    pub url: String,
    pub body: String,
    pub comments: Vec<CommentDto>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentDto {
    pub author: String,
    pub body: String,
    pub created_utc: i64,
    pub score: i64,
    pub id: String,
    pub spots: u32,
}

impl From<CommentEntry> for CommentDto {
    fn from(entry: CommentEntry) -> Self {
        Self {
            author: entry.author,
            body: entry.body,
            created_utc: entry.created_at,
            score: entry.score,
            id: entry.id,
            spots: entry.spots,
        }
    }
}

impl From<RaffleResult> for PostCommentsResponse {
    fn from(result: RaffleResult) -> Self {
        let RaffleResult { post, comments } = result;
        Self {
            title: post.title,
            author: post.author,
            created_utc: post.created_at,
            url: post.url,
            body: post.body,
            comments: comments.into_iter().map(CommentDto::from).collect(),
        }
    }
}

/// Response for GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy(now: DateTime<Utc>) -> Self {
        Self {
            status: "healthy",
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Response for GET /
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub status: &'static str,
    pub version: &'static str,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "Reddit Raffle Proxy API",
            status: "online",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
