//! Domain Value Objects

use std::fmt;
use thiserror::Error;
use url::Url;

/// Longest post id accepted; provider ids are short base36 strings
const MAX_POST_ID_LEN: usize = 12;

/// Host serving short links of the form `/<post id>`
const SHORT_LINK_HOST: &str = "redd.it";

/// Path segment preceding the post id in a gallery link
const GALLERY_SEGMENT: &str = "gallery";

/// Why a post reference was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostReferenceError {
    #[error("Post URL is empty")]
    Empty,
    #[error("Post URL is not a valid URL")]
    Malformed,
    #[error("Post URL must use http or https")]
    UnsupportedScheme,
    #[error("Post URL does not contain a post id")]
    MissingPostId,
}

/// Provider post id (base36, lowercase)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostId(String);

impl PostId {
    pub fn parse(raw: &str) -> Result<Self, PostReferenceError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_POST_ID_LEN
            && raw.bytes().all(|b| b.is_ascii_alphanumeric());
        if !valid {
            return Err(PostReferenceError::MissingPostId);
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Provider fullname of the post (`t3_<id>`)
    pub fn fullname(&self) -> String {
        format!("t3_{}", self.0)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A caller-supplied URL resolved to a provider post id
///
/// The post id is the path segment after `comments` (or `gallery`), as in
/// `https://www.reddit.com/r/<sub>/comments/<id>/<slug>/`, or the first
/// segment of a `https://redd.it/<id>` short link. A missing scheme is read
/// as https. Parsing never touches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReference {
    url: String,
    post_id: PostId,
}

impl PostReference {
    pub fn parse(raw: &str) -> Result<Self, PostReferenceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PostReferenceError::Empty);
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        let url = Url::parse(&candidate).map_err(|_| PostReferenceError::Malformed)?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(PostReferenceError::UnsupportedScheme);
        }

        let host = url
            .host_str()
            .ok_or(PostReferenceError::Malformed)?
            .to_ascii_lowercase();

        let segments: Vec<&str> = url
            .path_segments()
            .ok_or(PostReferenceError::MissingPostId)?
            .filter(|s| !s.is_empty())
            .collect();

        let id = if host == SHORT_LINK_HOST || host.ends_with(".redd.it") {
            segments.first().copied()
        } else {
            segments
                .iter()
                .position(|s| *s == "comments" || *s == GALLERY_SEGMENT)
                .and_then(|i| segments.get(i + 1).copied())
        }
        .ok_or(PostReferenceError::MissingPostId)?;

        Ok(Self {
            url: trimmed.to_string(),
            post_id: PostId::parse(id)?,
        })
    }

    /// The URL as the caller wrote it, trimmed
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn post_id(&self) -> &PostId {
        &self.post_id
    }
}
