//! Removal notices
//!
//! A raffle host drops unpaid participants by commenting on their own post,
//! either with a notice naming the accounts (`u/<name>`) or with a comment
//! that is nothing but a single `u/<name>` mention.

/// Phrases that mark a host comment as a removal notice (matched lowercase)
pub const REMOVAL_PHRASES: &[&str] = &[
    "unpaid participants: your unpaid slots have been removed",
    "removed due to lack of payment",
    "slots have been removed",
    "attention unpaid participants",
];

const MENTION_PREFIX: &str = "u/";

/// Accounts removed by one host comment, lowercased
///
/// Empty unless the comment is a removal notice or a bare mention.
pub fn removed_by(body: &str) -> Vec<String> {
    let lowered = body.to_lowercase();
    if REMOVAL_PHRASES.iter().any(|phrase| lowered.contains(phrase)) {
        return mentions(body);
    }
    bare_mention(body).into_iter().collect()
}

/// Every `u/<name>` mention in `body`, lowercased, in order of appearance
pub fn mentions(body: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = body;
    let mut preceding: Option<char> = None;

    while let Some(at) = rest.find(MENTION_PREFIX) {
        let before = rest[..at].chars().next_back().or(preceding);
        let after = &rest[at + MENTION_PREFIX.len()..];

        // `you/...` is not a mention; `/u/name` and `(u/name)` are
        let standalone = !before.is_some_and(|c| c.is_alphanumeric() || c == '_');
        let name = username_prefix(after);
        if standalone && !name.is_empty() {
            names.push(name.to_lowercase());
        }

        preceding = Some('/');
        rest = after;
    }
    names
}

/// The name in a comment consisting of exactly `u/<name>` or `/u/<name>`
fn bare_mention(body: &str) -> Option<String> {
    let trimmed = body.trim();
    let stripped = trimmed.strip_prefix('/').unwrap_or(trimmed);
    let name = stripped.strip_prefix(MENTION_PREFIX)?;
    let valid = !name.is_empty() && username_prefix(name).len() == name.len();
    valid.then(|| name.to_lowercase())
}

fn username_prefix(s: &str) -> &str {
    let end = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(s.len());
    &s[..end]
}
