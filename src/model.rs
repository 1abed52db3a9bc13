use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Origin-service post identifier.
///
/// Mastodon ids are decimal strings that grow with publication time, so two
/// ids compare by length first and then byte-wise. Non-numeric ids fall back
/// to the same rule, which keeps the ordering total.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for PostId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.as_bytes().cmp(other.0.as_bytes()))
    }
}

impl PartialOrd for PostId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    // Anything the origin invents later is treated like a DM.
    #[serde(other)]
    Direct,
}

impl Visibility {
    pub fn is_mirrorable(&self) -> bool {
        matches!(self, Visibility::Public | Visibility::Unlisted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
            Visibility::Direct => "direct",
        }
    }
}

/// A post read from the origin account, already reduced to plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePost {
    pub id: PostId,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub url: String,
    pub visibility: Visibility,
    pub has_media: bool,
    pub is_reply: bool,
    /// Set when the post replies to the origin account itself (a thread).
    pub reply_to_self: bool,
    pub in_reply_to_id: Option<PostId>,
    pub is_boost: bool,
    /// For a boost, the id of the boosted post.
    pub boost_of: Option<PostId>,
}

/// What the publisher hands to the destination for one source post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredPost {
    pub source_id: PostId,
    pub text: String,
    pub in_reply_to: Option<String>,
    /// Destination post to re-share instead of posting `text`.
    pub repost_of: Option<String>,
}

/// The authenticated origin account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub acct: String,
    #[serde(default)]
    pub url: String,
}
