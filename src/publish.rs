//! Sequential publishing with a state commit after every confirmed post.
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::SyncSettings;
use crate::model::{MirroredPost, PostId, SourcePost};
use crate::state::{Checkpoint, StateError, SyncState};
use crate::text;
use crate::twitter::Destination;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("destination rejected post {post_id}: {reason}")]
    Submit { post_id: PostId, reason: String },
    #[error("post {post_id} went out as {destination_id} but committing state failed: {source}")]
    Commit {
        post_id: PostId,
        destination_id: String,
        #[source]
        source: StateError,
    },
}

impl PublishError {
    pub fn post_id(&self) -> &PostId {
        match self {
            PublishError::Submit { post_id, .. } | PublishError::Commit { post_id, .. } => post_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSettings {
    pub max_chars: usize,
    pub link_reserve: usize,
    pub max_mirrored: usize,
    pub escape_mentions: bool,
    pub thread_self_replies: bool,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self::from(&SyncSettings::default())
    }
}

impl From<&SyncSettings> for PublishSettings {
    fn from(s: &SyncSettings) -> Self {
        Self {
            max_chars: s.max_chars,
            link_reserve: s.link_reserve,
            max_mirrored: s.max_mirrored,
            escape_mentions: s.escape_mentions,
            thread_self_replies: s.thread_self_replies,
        }
    }
}

/// Where an invocation stands. `position` is always the last committed id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running { position: Option<PostId> },
}

/// Destination representation of `post`.
pub fn mirror_of(post: &SourcePost, state: &SyncState, settings: &PublishSettings) -> MirroredPost {
    let body = if settings.escape_mentions {
        text::escape_mentions(&post.text)
    } else {
        post.text.clone()
    };
    let in_reply_to = if settings.thread_self_replies && post.reply_to_self {
        post.in_reply_to_id
            .as_ref()
            .and_then(|parent| state.destination_for(parent))
            .map(str::to_string)
    } else {
        None
    };
    let repost_of = if post.is_boost {
        post.boost_of
            .as_ref()
            .and_then(|boosted| state.destination_for(boosted))
            .map(str::to_string)
    } else {
        None
    };
    MirroredPost {
        source_id: post.id.clone(),
        text: text::compose(&body, &post.url, settings.max_chars, settings.link_reserve),
        in_reply_to,
        repost_of,
    }
}

pub struct Publisher<'a> {
    destination: &'a dyn Destination,
    checkpoint: &'a mut dyn Checkpoint,
    settings: PublishSettings,
    phase: RunPhase,
}

impl<'a> Publisher<'a> {
    pub fn new(
        destination: &'a dyn Destination,
        checkpoint: &'a mut dyn Checkpoint,
        settings: PublishSettings,
    ) -> Self {
        Self {
            destination,
            checkpoint,
            settings,
            phase: RunPhase::Idle,
        }
    }

    pub fn phase(&self) -> &RunPhase {
        &self.phase
    }

    /// Mirror `pending` in order. State is committed after each post, so a
    /// failure leaves every earlier post recorded and stops the batch.
    #[instrument(skip_all, fields(pending = pending.len()))]
    pub async fn publish_all(
        &mut self,
        pending: &[SourcePost],
        mut state: SyncState,
    ) -> Result<SyncState, PublishError> {
        self.phase = RunPhase::Running {
            position: state.last_synced_id.clone(),
        };

        for post in pending {
            let mirrored = mirror_of(post, &state, &self.settings);
            let submitted = match &mirrored.repost_of {
                Some(target) => self.destination.repost(target).await,
                None => {
                    self.destination
                        .create_post(&mirrored.text, mirrored.in_reply_to.as_deref())
                        .await
                }
            };
            let destination_id = match submitted {
                Ok(id) => id,
                Err(err) => {
                    warn!(post_id = %post.id, error = %format!("{:#}", err), "publish failed; stopping batch");
                    return Err(PublishError::Submit {
                        post_id: post.id.clone(),
                        reason: format!("{:#}", err),
                    });
                }
            };

            state.record_mirrored(&post.id, &destination_id, self.settings.max_mirrored);
            if let Err(source) = self.checkpoint.commit(&state) {
                return Err(PublishError::Commit {
                    post_id: post.id.clone(),
                    destination_id,
                    source,
                });
            }
            self.phase = RunPhase::Running {
                position: state.last_synced_id.clone(),
            };
            info!(
                post_id = %post.id,
                destination_id = %destination_id,
                threaded = mirrored.in_reply_to.is_some(),
                repost = mirrored.repost_of.is_some(),
                "mirrored post"
            );
        }

        self.phase = RunPhase::Idle;
        Ok(state)
    }
}
