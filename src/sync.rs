//! One invocation: fetch, reconcile, publish.
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::SyncError;
use crate::links::LinkExpander;
use crate::mastodon::Timeline;
use crate::model::{PostId, SourcePost};
use crate::publish::{mirror_of, PublishSettings, Publisher};
use crate::reconcile::{self, EligibilityRules};
use crate::state::{Checkpoint, SyncState};
use crate::twitter::Destination;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Compute and log what would be posted without posting or saving.
    pub dry_run: bool,
    /// With `dry_run`, still move the saved position past the pending posts.
    pub update: bool,
}

impl RunOptions {
    fn may_write_state(&self) -> bool {
        !self.dry_run || self.update
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: usize,
    pub pending: usize,
    pub published: usize,
    pub last_synced_id: Option<PostId>,
}

/// Run a single sync pass over already-loaded `state`.
///
/// `checkpoint` receives every state change as it happens; nothing is
/// written in a plain dry run.
#[instrument(skip_all, fields(dry_run = options.dry_run))]
pub async fn run_once(
    cfg: &Config,
    timeline: &dyn Timeline,
    destination: &dyn Destination,
    checkpoint: &mut dyn Checkpoint,
    mut state: SyncState,
    options: RunOptions,
) -> Result<SyncReport, SyncError> {
    let learned_account = state.source_account_id.is_none();
    let account_id = match state.source_account_id.clone() {
        Some(id) => id,
        None => {
            let account = timeline
                .verify_credentials()
                .await
                .map_err(|source| SyncError::Fetch {
                    account: cfg.source.api_base_url.clone(),
                    source,
                })?;
            info!(account = %account.acct, account_id = %account.id, "verified source account");
            state.source_account_id = Some(account.id.clone());
            account.id
        }
    };

    let posts = timeline
        .fetch_recent(
            &account_id,
            cfg.sync.fetch_limit,
            state.last_synced_id.as_ref(),
        )
        .await
        .map_err(|source| SyncError::Fetch {
            account: account_id.clone(),
            source,
        })?;
    debug!(account_id = %account_id, fetched = posts.len(), last_synced_id = ?state.last_synced_id, "fetched");

    let rules = EligibilityRules::from(&cfg.sync);
    let mut report = SyncReport {
        fetched: posts.len(),
        ..Default::default()
    };

    if let Some(baseline) = reconcile::cold_start_baseline(&posts, &state, &rules) {
        info!(baseline = %baseline, "cold start: recording newest post without mirroring history");
        if options.may_write_state() {
            state.advance_to(&baseline);
            checkpoint.commit(&state)?;
        }
        report.last_synced_id = state.last_synced_id;
        return Ok(report);
    }

    let mut pending = reconcile::pending(&posts, &state, &rules);
    report.pending = pending.len();

    if pending.is_empty() {
        info!(account_id = %account_id, "nothing to sync");
        if learned_account && options.may_write_state() {
            checkpoint.commit(&state)?;
        }
        report.last_synced_id = state.last_synced_id;
        return Ok(report);
    }

    if cfg.sync.expand_links {
        expand_links(&mut pending).await;
    }

    let settings = PublishSettings::from(&cfg.sync);

    if options.dry_run {
        for post in &pending {
            let mirrored = mirror_of(post, &state, &settings);
            info!(
                post_id = %post.id,
                reply_to = ?mirrored.in_reply_to,
                repost_of = ?mirrored.repost_of,
                text = %mirrored.text,
                "dry run: would post"
            );
        }
        if options.update {
            if let Some(newest) = pending.last() {
                state.advance_to(&newest.id);
                checkpoint.commit(&state)?;
            }
        }
        report.last_synced_id = state.last_synced_id;
        return Ok(report);
    }

    let mut publisher = Publisher::new(destination, checkpoint, settings);
    let state = publisher.publish_all(&pending, state).await?;
    report.published = pending.len();
    report.last_synced_id = state.last_synced_id;
    info!(
        published = report.published,
        last_synced_id = ?report.last_synced_id,
        "sync complete"
    );
    Ok(report)
}

async fn expand_links(pending: &mut [SourcePost]) {
    let expander = match LinkExpander::new() {
        Ok(expander) => expander,
        Err(err) => {
            warn!(error = %err, "cannot build link expander; posting links as they are");
            return;
        }
    };
    for post in pending.iter_mut() {
        post.text = expander.expand(&post.text).await;
    }
}
