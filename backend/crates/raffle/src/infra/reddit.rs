//! Reddit content provider
//!
//! Application-only OAuth (client credentials grant) and the comments
//! listing endpoint, with top-level "load more comments" stubs expanded
//! through `/api/morechildren`.

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::{Client, Response, StatusCode, header};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::application::config::RaffleConfig;
use crate::domain::provider::{
    CommentNode, ContentProvider, ProviderCredentials, ProviderError, ProviderResult,
    ProviderSession, RawPost, RawThread,
};
use crate::domain::value_objects::PostId;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifetime assumed when the token response omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Upper bound on morechildren round trips per thread
const MAX_EXPANSION_ROUNDS: usize = 50;

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<Value>,
}

/// `{"kind": ..., "data": ...}` envelope around every listing item
#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    #[serde(default)]
    title: String,
    author: Option<String>,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    selftext: String,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    id: String,
    author: Option<String>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    parent_id: String,
    /// Empty string when there are no replies, otherwise a listing
    #[serde(default)]
    replies: Value,
}

#[derive(Debug, Deserialize)]
struct MoreData {
    #[serde(default)]
    children: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenResponse {
    json: MoreChildrenJson,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenJson {
    #[serde(default)]
    errors: Vec<Value>,
    #[serde(default)]
    data: Option<MoreChildrenData>,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenData {
    #[serde(default)]
    things: Vec<Thing>,
}

/// Item of a top-level comment listing before expansion
#[derive(Debug, Clone, PartialEq)]
enum TopLevelItem {
    Comment(CommentNode),
    /// Ids hidden behind a "load more comments" stub
    More(Vec<String>),
}

/// Reddit API client
pub struct RedditProvider {
    client: Client,
    auth_base_url: String,
    api_base_url: String,
    comment_sort: String,
    comment_limit: u32,
    more_children_batch: usize,
}

impl RedditProvider {
    pub fn new(config: &RaffleConfig, user_agent: &str) -> ProviderResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            auth_base_url: config.auth_base_url.trim_end_matches('/').to_string(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            comment_sort: config.comment_sort.clone(),
            comment_limit: config.comment_limit,
            more_children_batch: config.more_children_batch.max(1),
        })
    }

    async fn fetch_listing(
        &self,
        session: &ProviderSession,
        post_id: &PostId,
    ) -> ProviderResult<Value> {
        let url = format!("{}/comments/{}", self.api_base_url, post_id);
        let limit = self.comment_limit.to_string();
        let response = self
            .client
            .get(&url)
            .bearer_auth(session.access_token.expose())
            .query(&[
                ("sort", self.comment_sort.as_str()),
                ("limit", limit.as_str()),
                ("depth", "1"),
                ("raw_json", "1"),
            ])
            .send()
            .await?;

        let response = check_status(response)?;
        Ok(response.json::<Value>().await?)
    }

    async fn fetch_more_children(
        &self,
        session: &ProviderSession,
        post_id: &PostId,
        ids: &[String],
    ) -> ProviderResult<Vec<TopLevelItem>> {
        let url = format!("{}/api/morechildren", self.api_base_url);
        let link_id = post_id.fullname();
        let children = ids.join(",");
        let response = self
            .client
            .get(&url)
            .bearer_auth(session.access_token.expose())
            .query(&[
                ("api_type", "json"),
                ("link_id", link_id.as_str()),
                ("children", children.as_str()),
                ("sort", self.comment_sort.as_str()),
                ("raw_json", "1"),
            ])
            .send()
            .await?;

        let response = check_status(response)?;
        let body: MoreChildrenResponse = response.json().await?;
        if !body.json.errors.is_empty() {
            return Err(ProviderError::Unavailable(format!(
                "morechildren errors: {:?}",
                body.json.errors
            )));
        }

        let things = body.json.data.map(|d| d.things).unwrap_or_default();
        parse_more_children(things, &link_id)
    }

    /// Replace "more" stubs with the comments they stand for, in place
    async fn expand(
        &self,
        session: &ProviderSession,
        post_id: &PostId,
        items: Vec<TopLevelItem>,
    ) -> ProviderResult<Vec<CommentNode>> {
        let mut pending = items;
        let mut rounds = 0;
        let mut truncated = false;

        while !truncated && pending.iter().any(|i| matches!(i, TopLevelItem::More(_))) {
            let mut next = Vec::with_capacity(pending.len());
            for item in pending {
                let ids = match item {
                    TopLevelItem::Comment(c) => {
                        next.push(TopLevelItem::Comment(c));
                        continue;
                    }
                    TopLevelItem::More(ids) => ids,
                };
                for batch in ids.chunks(self.more_children_batch) {
                    if rounds >= MAX_EXPANSION_ROUNDS {
                        truncated = true;
                        break;
                    }
                    rounds += 1;
                    let expanded = self.fetch_more_children(session, post_id, batch).await?;
                    next.extend(expanded);
                }
            }
            pending = next;
        }

        if truncated {
            tracing::warn!(post_id = %post_id, rounds, "Stopped expanding more-comment stubs");
        }

        Ok(pending
            .into_iter()
            .filter_map(|item| match item {
                TopLevelItem::Comment(c) => Some(c),
                TopLevelItem::More(_) => None,
            })
            .collect())
    }
}

impl ContentProvider for RedditProvider {
    async fn authenticate(
        &self,
        credentials: &ProviderCredentials,
    ) -> ProviderResult<ProviderSession> {
        let url = format!("{}/api/v1/access_token", self.auth_base_url);
        let response = self
            .client
            .post(&url)
            .header(header::USER_AGENT, credentials.user_agent.as_str())
            .basic_auth(
                &credentials.client_id,
                Some(credentials.client_secret.expose()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProviderError::InvalidCredentials(format!(
                    "token endpoint answered {}",
                    response.status()
                )));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(ProviderError::RateLimited {
                    retry_after_secs: retry_after(&response),
                });
            }
            status if !status.is_success() => {
                return Err(ProviderError::Unavailable(format!(
                    "token endpoint answered {status}"
                )));
            }
            _ => {}
        }

        let token: TokenResponse = response.json().await?;
        session_from_token(token)
    }

    async fn fetch_thread(
        &self,
        session: &ProviderSession,
        post_id: &PostId,
    ) -> ProviderResult<RawThread> {
        let listing = self.fetch_listing(session, post_id).await?;
        let (post, items) = parse_thread(listing)?;
        let comments = self.expand(session, post_id, items).await?;

        tracing::debug!(post_id = %post_id, comments = comments.len(), "Fetched thread");
        Ok(RawThread { post, comments })
    }
}

fn session_from_token(token: TokenResponse) -> ProviderResult<ProviderSession> {
    if let Some(error) = token.error {
        return Err(ProviderError::InvalidCredentials(format!(
            "token endpoint error: {error}"
        )));
    }
    let access_token = token
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ProviderError::Malformed("token response without access_token".into()))?;
    let lifetime = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

    Ok(ProviderSession::new(
        access_token,
        Utc::now() + ChronoDuration::seconds(lifetime),
    ))
}

fn check_status(response: Response) -> ProviderResult<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED => Err(ProviderError::Unauthorized),
        StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Err(ProviderError::NotFound),
        StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited {
            retry_after_secs: retry_after(&response),
        }),
        status => Err(ProviderError::Unavailable(format!(
            "provider answered {status}"
        ))),
    }
}

fn retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.ceil() as u64)
}

/// Split the two-listing comments response into the post and its top level
fn parse_thread(body: Value) -> ProviderResult<(RawPost, Vec<TopLevelItem>)> {
    let listings: Vec<Thing> = serde_json::from_value(body)
        .map_err(|e| ProviderError::Malformed(format!("comments response: {e}")))?;
    let mut listings = listings.into_iter();

    let post_listing = listings.next().ok_or(ProviderError::NotFound)?;
    let post = listing_children(post_listing)?
        .into_iter()
        .find(|t| t.kind == "t3")
        .ok_or(ProviderError::NotFound)?;
    let post: PostData = from_data(post.data)?;

    let comments = match listings.next() {
        Some(listing) => listing_children(listing)?,
        None => Vec::new(),
    };

    let mut items = Vec::with_capacity(comments.len());
    for thing in comments {
        if let Some(item) = top_level_item(thing)? {
            items.push(item);
        }
    }

    Ok((
        RawPost {
            id: post.id,
            title: post.title,
            author: post.author,
            created_utc: post.created_utc,
            selftext: post.selftext,
        },
        items,
    ))
}

fn parse_more_children(
    things: Vec<Thing>,
    link_fullname: &str,
) -> ProviderResult<Vec<TopLevelItem>> {
    let mut items = Vec::new();
    for thing in things {
        let parent = thing
            .data
            .get("parent_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        // morechildren returns descendants of every depth
        if parent != link_fullname {
            continue;
        }
        if let Some(item) = top_level_item(thing)? {
            items.push(item);
        }
    }
    Ok(items)
}

fn top_level_item(thing: Thing) -> ProviderResult<Option<TopLevelItem>> {
    match thing.kind.as_str() {
        "t1" => Ok(Some(TopLevelItem::Comment(comment_node(from_data(
            thing.data,
        )?)?))),
        "more" => {
            let more: MoreData = from_data(thing.data)?;
            // A stub without ids is a "continue this thread" link
            Ok((!more.children.is_empty()).then_some(TopLevelItem::More(more.children)))
        }
        _ => Ok(None),
    }
}

fn comment_node(data: CommentData) -> ProviderResult<CommentNode> {
    let replies = match data.replies {
        Value::Object(_) => {
            let listing: Thing = from_data(data.replies)?;
            listing_children(listing)?
                .into_iter()
                .filter(|t| t.kind == "t1")
                .map(|t| from_data(t.data).and_then(comment_node))
                .collect::<ProviderResult<Vec<_>>>()?
        }
        _ => Vec::new(),
    };

    Ok(CommentNode {
        id: data.id,
        author: data.author,
        body: data.body,
        created_utc: data.created_utc,
        score: data.score,
        parent_id: data.parent_id,
        replies,
    })
}

fn listing_children(thing: Thing) -> ProviderResult<Vec<Thing>> {
    if thing.kind != "Listing" {
        return Err(ProviderError::Malformed(format!(
            "expected Listing, got {}",
            thing.kind
        )));
    }
    let listing: ListingData = from_data(thing.data)?;
    Ok(listing.children)
}

fn from_data<T: for<'de> Deserialize<'de>>(data: Value) -> ProviderResult<T> {
    serde_json::from_value(data).map_err(|e| ProviderError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// morechildren calls made for the `flood` post
    static FLOOD_EXPANSIONS: AtomicUsize = AtomicUsize::new(0);

    fn comment(id: &str, author: &str, body: &str, parent: &str) -> Value {
        json!({
            "kind": "t1",
            "data": {
                "id": id,
                "author": author,
                "body": body,
                "created_utc": 1_700_000_100.0,
                "score": 3,
                "parent_id": parent,
                "replies": ""
            }
        })
    }

    fn thread_fixture() -> Value {
        let mut with_reply = comment("c2", "bob", "two spots", "t3_abc123");
        with_reply["data"]["replies"] = json!({
            "kind": "Listing",
            "data": { "children": [comment("r1", "carol", "3 spots", "t1_c2")] }
        });

        listing(
            "abc123",
            vec![
                comment("c1", "alice", "I want 2 spots", "t3_abc123"),
                with_reply,
                more_stub(&["c3", "c4"], "t3_abc123"),
            ],
        )
    }

    /// A post whose comments all sit behind one huge "more" stub
    fn flood_fixture() -> Value {
        let ids: Vec<String> = (0..500).map(|i| format!("f{i}")).collect();
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        listing("flood", vec![more_stub(&ids, "t3_flood")])
    }

    fn more_stub(ids: &[&str], parent: &str) -> Value {
        json!({
            "kind": "more",
            "data": { "count": ids.len(), "children": ids, "parent_id": parent }
        })
    }

    fn listing(id: &str, comments: Vec<Value>) -> Value {
        json!([
            {
                "kind": "Listing",
                "data": { "children": [{
                    "kind": "t3",
                    "data": {
                        "id": id,
                        "title": "Test Raffle",
                        "author": "op",
                        "created_utc": 1_700_000_000.0,
                        "selftext": "10 spots at $5"
                    }
                }]}
            },
            {
                "kind": "Listing",
                "data": { "children": comments }
            }
        ])
    }

    #[test]
    fn test_parse_thread_fixture() {
        let (post, items) = parse_thread(thread_fixture()).unwrap();
        assert_eq!(post.id, "abc123");
        assert_eq!(post.title, "Test Raffle");
        assert_eq!(post.author.as_deref(), Some("op"));
        assert_eq!(post.created_utc, 1_700_000_000.0);

        assert_eq!(items.len(), 3);
        match &items[1] {
            TopLevelItem::Comment(c) => {
                assert_eq!(c.id, "c2");
                assert_eq!(c.replies.len(), 1);
                assert_eq!(c.replies[0].id, "r1");
            }
            other => panic!("expected comment, got {other:?}"),
        }
        assert_eq!(
            items[2],
            TopLevelItem::More(vec!["c3".to_string(), "c4".to_string()])
        );
    }

    #[test]
    fn test_parse_thread_rejects_garbage() {
        assert!(matches!(
            parse_thread(json!({"unexpected": true})),
            Err(ProviderError::Malformed(_))
        ));
        assert!(matches!(parse_thread(json!([])), Err(ProviderError::NotFound)));
    }

    #[test]
    fn test_more_children_keeps_only_top_level() {
        let things: Vec<Thing> = serde_json::from_value(json!([
            comment("c3", "dave", "1 spot", "t3_abc123"),
            comment("r9", "erin", "nested", "t1_c3"),
            comment("c4", "frank", "in", "t3_abc123"),
        ]))
        .unwrap();

        let items = parse_more_children(things, "t3_abc123").unwrap();
        let ids: Vec<_> = items
            .iter()
            .map(|i| match i {
                TopLevelItem::Comment(c) => c.id.as_str(),
                TopLevelItem::More(_) => "more",
            })
            .collect();
        assert_eq!(ids, vec!["c3", "c4"]);
    }

    #[test]
    fn test_token_response_handling() {
        let session = session_from_token(TokenResponse {
            access_token: Some("tok".into()),
            expires_in: Some(86_400),
            error: None,
        })
        .unwrap();
        assert_eq!(session.access_token.expose(), "tok");
        assert!(session.expires_at > Utc::now() + ChronoDuration::hours(23));

        let err = session_from_token(TokenResponse {
            access_token: None,
            expires_in: None,
            error: Some(json!("invalid_grant")),
        })
        .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidCredentials(_)));
    }

    // ------------------------------------------------------------------
    // Loopback provider
    // ------------------------------------------------------------------

    async fn token(headers: HeaderMap) -> impl IntoResponse {
        // "client:secret" in basic auth
        let expected = "Basic Y2xpZW50OnNlY3JldA==";
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some(expected);
        if !authorized {
            return (AxumStatus::UNAUTHORIZED, Json(json!({"error": 401}))).into_response();
        }
        Json(json!({"access_token": "loopback-token", "expires_in": 3600})).into_response()
    }

    async fn comments(Path(id): Path<String>, headers: HeaderMap) -> impl IntoResponse {
        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok());
        if bearer != Some("Bearer loopback-token") {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        match id.as_str() {
            "abc123" => Json(thread_fixture()).into_response(),
            "flood" => Json(flood_fixture()).into_response(),
            "throttled" => (AxumStatus::TOO_MANY_REQUESTS, [("retry-after", "7")]).into_response(),
            "broken" => AxumStatus::BAD_GATEWAY.into_response(),
            _ => (AxumStatus::NOT_FOUND, Json(json!({"error": 404}))).into_response(),
        }
    }

    async fn more_children(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
        let link_id = params.get("link_id").cloned().unwrap_or_default();
        assert!(link_id == "t3_abc123" || link_id == "t3_flood", "link_id {link_id}");
        if link_id == "t3_flood" {
            FLOOD_EXPANSIONS.fetch_add(1, Ordering::SeqCst);
        }
        let things: Vec<Value> = params
            .get("children")
            .map(|c| c.split(',').collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .map(|id| comment(id, "late", "2 spots", &link_id))
            .collect();
        Json(json!({"json": {"errors": [], "data": {"things": things}}}))
    }

    async fn loopback_provider() -> RedditProvider {
        let app = Router::new()
            .route("/api/v1/access_token", post(token))
            .route("/comments/{id}", get(comments))
            .route("/api/morechildren", get(more_children));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = RaffleConfig {
            auth_base_url: format!("http://{addr}"),
            api_base_url: format!("http://{addr}/"),
            more_children_batch: 1,
            ..RaffleConfig::default()
        };
        RedditProvider::new(&config, "raffle-tests/0.1").unwrap()
    }

    #[tokio::test]
    async fn test_loopback_authenticate_and_fetch() {
        let provider = loopback_provider().await;
        let credentials = ProviderCredentials::new("client", "secret", "raffle-tests/0.1");

        let session = provider.authenticate(&credentials).await.unwrap();
        assert_eq!(session.access_token.expose(), "loopback-token");

        let thread = provider
            .fetch_thread(&session, &PostId::parse("abc123").unwrap())
            .await
            .unwrap();
        let ids: Vec<_> = thread.comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);
        assert_eq!(thread.post.selftext, "10 spots at $5");
    }

    #[tokio::test]
    async fn test_loopback_bad_credentials() {
        let provider = loopback_provider().await;
        let credentials = ProviderCredentials::new("client", "wrong", "raffle-tests/0.1");

        let err = provider.authenticate(&credentials).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidCredentials(_)));
    }

    async fn fetch_post(
        provider: &RedditProvider,
        session: &ProviderSession,
        id: &str,
    ) -> ProviderResult<RawThread> {
        provider
            .fetch_thread(session, &PostId::parse(id).unwrap())
            .await
    }

    #[tokio::test]
    async fn test_loopback_status_mapping() {
        let provider = loopback_provider().await;
        let valid = ProviderSession::new("loopback-token", Utc::now() + ChronoDuration::hours(1));
        let stale = ProviderSession::new("expired-token", Utc::now() + ChronoDuration::hours(1));

        assert_eq!(
            fetch_post(&provider, &valid, "missing").await.unwrap_err(),
            ProviderError::NotFound
        );
        assert_eq!(
            fetch_post(&provider, &valid, "throttled").await.unwrap_err(),
            ProviderError::RateLimited { retry_after_secs: Some(7) }
        );
        assert!(matches!(
            fetch_post(&provider, &valid, "broken").await.unwrap_err(),
            ProviderError::Unavailable(_)
        ));
        assert_eq!(
            fetch_post(&provider, &stale, "abc123").await.unwrap_err(),
            ProviderError::Unauthorized
        );
    }

    #[tokio::test]
    async fn test_loopback_expansion_is_capped_within_one_stub() {
        // Batch size 1: the 500 ids would otherwise cost 500 calls
        let provider = loopback_provider().await;
        let session = ProviderSession::new("loopback-token", Utc::now() + ChronoDuration::hours(1));

        let thread = fetch_post(&provider, &session, "flood").await.unwrap();
        assert_eq!(FLOOD_EXPANSIONS.load(Ordering::SeqCst), MAX_EXPANSION_ROUNDS);
        assert_eq!(thread.comments.len(), MAX_EXPANSION_ROUNDS);
        assert_eq!(thread.comments[0].id, "f0");
    }
}
