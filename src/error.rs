use thiserror::Error;

use crate::config::ConfigError;
use crate::mastodon::FetchError;
use crate::publish::PublishError;
use crate::state::StateError;

/// Everything that ends an invocation early.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("fetching posts for {account}: {source}")]
    Fetch {
        account: String,
        #[source]
        source: FetchError,
    },
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    State(#[from] StateError),
}

impl SyncError {
    /// Process exit status, one per failure category.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) => 2,
            SyncError::Fetch { .. } => 3,
            SyncError::Publish(PublishError::Submit { .. }) => 4,
            SyncError::Publish(PublishError::Commit { .. }) | SyncError::State(_) => 5,
        }
    }
}
