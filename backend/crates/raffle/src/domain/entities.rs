//! Domain Entities

use serde::Serialize;

/// A fetched provider post
///
/// Immutable once built; lives for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub title: String,
    pub author: String,
    /// Epoch seconds
    pub created_at: i64,
    /// URL the caller asked for
    pub url: String,
    pub body: String,
}

/// One top-level comment read as a raffle entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentEntry {
    pub author: String,
    pub body: String,
    /// Epoch seconds
    pub created_at: i64,
    /// Net votes, may be negative
    pub score: i64,
    /// Provider-unique comment id
    pub id: String,
    /// Always derived from `body`, never provider-supplied
    pub spots: u32,
}

/// A post and its entries in provider top-level order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaffleResult {
    pub post: Post,
    pub comments: Vec<CommentEntry>,
}

impl RaffleResult {
    pub fn new(post: Post, comments: Vec<CommentEntry>) -> Self {
        Self { post, comments }
    }

    /// Sum of requested spots over all entries
    pub fn total_spots(&self) -> u64 {
        self.comments.iter().map(|c| u64::from(c.spots)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, spots: u32) -> CommentEntry {
        CommentEntry {
            author: "user".to_string(),
            body: String::new(),
            created_at: 0,
            score: -2,
            id: id.to_string(),
            spots,
        }
    }

    #[test]
    fn test_total_spots() {
        let post = Post {
            title: "t".to_string(),
            author: "op".to_string(),
            created_at: 1,
            url: "https://example.com".to_string(),
            body: String::new(),
        };
        let result = RaffleResult::new(post, vec![entry("a", 2), entry("b", 0), entry("c", 5)]);
        assert_eq!(result.total_spots(), 7);
        assert_eq!(result.comments[1].id, "b");
    }
}
