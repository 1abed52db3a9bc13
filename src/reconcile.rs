//! Deciding which fetched posts still need mirroring.
//!
//! Everything here is pure: the caller supplies the fetched page and the
//! current [`SyncState`], and gets back the posts to publish, oldest first.
use std::collections::HashSet;
use tracing::debug;

use crate::config::{ColdStart, SyncSettings};
use crate::model::{PostId, SourcePost};
use crate::state::SyncState;

/// Which kinds of posts are worth mirroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityRules {
    pub include_self_replies: bool,
    pub include_boosts: bool,
    pub include_media_posts: bool,
    pub cold_start: ColdStart,
}

impl Default for EligibilityRules {
    fn default() -> Self {
        Self::from(&SyncSettings::default())
    }
}

impl From<&SyncSettings> for EligibilityRules {
    fn from(s: &SyncSettings) -> Self {
        Self {
            include_self_replies: s.include_self_replies,
            include_boosts: s.include_boosts,
            include_media_posts: s.include_media_posts,
            cold_start: s.cold_start,
        }
    }
}

impl EligibilityRules {
    /// Why `post` must not be mirrored, or `None` when it may be.
    ///
    /// A boost of a post that is still in the mirrored ledger is always
    /// eligible; it becomes a repost of the paired destination post.
    pub fn rejection(&self, post: &SourcePost, state: &SyncState) -> Option<&'static str> {
        if !post.visibility.is_mirrorable() {
            return Some("not public");
        }
        if post.is_boost {
            if is_self_boost(post, state) {
                return None;
            }
            if !self.include_boosts {
                return Some("it is a boost");
            }
        }
        if post.is_reply && !post.reply_to_self {
            return Some("it replies to another account");
        }
        if post.is_reply && !self.include_self_replies {
            return Some("it is a self reply");
        }
        if post.has_media && !self.include_media_posts {
            return Some("it carries media");
        }
        None
    }
}

/// Posts newer than the synced position that pass `rules`, oldest first.
///
/// `posts` is the newest-first page returned by the fetcher. Anything older
/// than the page simply never shows up here: lookback is bounded by the page
/// size. On a cold start with [`ColdStart::Skip`] nothing is pending; see
/// [`cold_start_baseline`].
pub fn pending(posts: &[SourcePost], state: &SyncState, rules: &EligibilityRules) -> Vec<SourcePost> {
    if state.is_cold_start() && rules.cold_start == ColdStart::Skip {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut out: Vec<SourcePost> = posts
        .iter()
        .rev()
        .filter(|p| is_newer(&p.id, state.last_synced_id.as_ref()))
        .filter(|p| seen.insert(p.id.clone()))
        .filter(|p| match rules.rejection(p, state) {
            Some(reason) => {
                debug!(post_id = %p.id, reason, "skipping post");
                false
            }
            None => true,
        })
        .cloned()
        .collect();
    // Pages are newest-first, but don't trust the origin blindly.
    out.sort_by(|a, b| a.id.cmp(&b.id));
    out
}

/// Position to record on a cold start that skips history: the newest fetched
/// post, eligible or not.
pub fn cold_start_baseline(posts: &[SourcePost], state: &SyncState, rules: &EligibilityRules) -> Option<PostId> {
    if !state.is_cold_start() || rules.cold_start != ColdStart::Skip {
        return None;
    }
    posts.iter().map(|p| &p.id).max().cloned()
}

/// Whether `post` boosts something this relay already mirrored.
pub fn is_self_boost(post: &SourcePost, state: &SyncState) -> bool {
    post.boost_of
        .as_ref()
        .is_some_and(|boosted| state.destination_for(boosted).is_some())
}

fn is_newer(id: &PostId, last: Option<&PostId>) -> bool {
    last.map_or(true, |last| id > last)
}
