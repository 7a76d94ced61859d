//! Post Fetcher
//!
//! Resolves a post reference, retrieves the thread through the shared
//! session and flattens it into raffle entries.

use std::collections::HashSet;
use std::sync::Arc;

use crate::application::config::RaffleConfig;
use crate::application::session_cache::ProviderClientCache;
use crate::domain::entities::{CommentEntry, Post, RaffleResult};
use crate::domain::provider::{
    CommentNode, ContentProvider, ProviderError, ProviderResult, RawThread, is_tombstone,
};
use crate::domain::{removals, spots};
use crate::domain::value_objects::PostReference;
use crate::error::ProxyResult;

/// Author shown for deleted accounts
pub const DELETED_AUTHOR: &str = "[deleted]";

/// Post Fetcher
pub struct PostFetcher<P>
where
    P: ContentProvider,
{
    cache: Arc<ProviderClientCache<P>>,
    config: Arc<RaffleConfig>,
}

impl<P> PostFetcher<P>
where
    P: ContentProvider + Send + Sync + 'static,
{
    pub fn new(cache: Arc<ProviderClientCache<P>>, config: Arc<RaffleConfig>) -> Self {
        Self { cache, config }
    }

    /// Validate a caller-supplied URL; never touches the network
    pub fn parse_reference(&self, raw: &str) -> ProxyResult<PostReference> {
        Ok(PostReference::parse(raw)?)
    }

    /// Fetch and flatten a post in one step
    pub async fn fetch(&self, reference: &PostReference) -> ProxyResult<RaffleResult> {
        let thread = self.retrieve(reference).await?;
        Ok(self.build_result(reference, thread))
    }

    /// Retrieve the raw thread through the cached session
    ///
    /// If the provider rejects the session mid-fetch it is invalidated and
    /// the fetch is repeated once with a fresh session.
    pub async fn retrieve(&self, reference: &PostReference) -> ProviderResult<RawThread> {
        let post_id = reference.post_id();
        let session = self.cache.get_client().await?;

        match self.cache.provider().fetch_thread(&session, post_id).await {
            Err(ProviderError::Unauthorized) => {
                tracing::info!(post_id = %post_id, "Provider session rejected; refreshing");
                self.cache.invalidate(&session).await;
                let session = self.cache.get_client().await?;
                self.cache.provider().fetch_thread(&session, post_id).await
            }
            other => other,
        }
    }

    /// Map a raw thread to the raffle result
    ///
    /// Keeps provider order. Drops tombstoned comments, ignored accounts,
    /// accounts the post author removed and (when configured) the post
    /// author's own comments.
    pub fn build_result(&self, reference: &PostReference, thread: RawThread) -> RaffleResult {
        let RawThread { post, comments } = thread;
        let post_author = post
            .author
            .clone()
            .filter(|author| author != DELETED_AUTHOR);

        let removed = post_author
            .as_deref()
            .map(|author| removed_accounts(&comments, author))
            .unwrap_or_default();

        let total = comments.len();
        let entries: Vec<CommentEntry> = comments
            .into_iter()
            .filter(|c| self.is_entry(c, post_author.as_deref(), &removed))
            .map(to_entry)
            .collect();

        tracing::debug!(
            post_id = %reference.post_id(),
            comments = total,
            entries = entries.len(),
            removed = removed.len(),
            "Flattened comment tree"
        );

        let post = Post {
            title: post.title,
            author: post.author.unwrap_or_else(|| DELETED_AUTHOR.to_string()),
            created_at: post.created_utc as i64,
            url: reference.url().to_string(),
            body: post.selftext,
        };

        RaffleResult::new(post, entries)
    }

    fn is_entry(
        &self,
        comment: &CommentNode,
        post_author: Option<&str>,
        removed: &HashSet<String>,
    ) -> bool {
        if is_tombstone(&comment.body) {
            return false;
        }
        let Some(author) = comment.author.as_deref() else {
            return true;
        };
        if self.config.is_ignored_author(author) || removed.contains(&author.to_lowercase()) {
            return false;
        }
        !(self.config.exclude_post_author && post_author == Some(author))
    }
}

/// Lowercased accounts removed by the post author anywhere in the tree
fn removed_accounts(comments: &[CommentNode], post_author: &str) -> HashSet<String> {
    let mut removed = HashSet::new();
    let mut pending: Vec<&CommentNode> = comments.iter().collect();
    while let Some(comment) = pending.pop() {
        if comment.author.as_deref() == Some(post_author) {
            removed.extend(removals::removed_by(&comment.body));
        }
        pending.extend(comment.replies.iter());
    }
    removed
}

fn to_entry(comment: CommentNode) -> CommentEntry {
    let spots = spots::extract(&comment.body);
    CommentEntry {
        author: comment
            .author
            .unwrap_or_else(|| DELETED_AUTHOR.to_string()),
        spots,
        body: comment.body,
        created_at: comment.created_utc as i64,
        score: comment.score,
        id: comment.id,
    }
}
