use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::config::Mastodon;
use crate::model::{Account, PostId, SourcePost, Visibility};
use crate::text;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid Mastodon URL: {0}")]
    Url(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },
}

/// Read side of the origin account.
#[async_trait]
pub trait Timeline: Send + Sync {
    async fn verify_credentials(&self) -> Result<Account, FetchError>;

    /// Newest-first, at most `limit` posts, optionally only those after `since`.
    async fn fetch_recent(
        &self,
        account_id: &str,
        limit: u32,
        since: Option<&PostId>,
    ) -> Result<Vec<SourcePost>, FetchError>;
}

#[derive(Clone)]
pub struct MastodonClient {
    http: Client,
    base_url: Url,
    access_token: String,
}

impl fmt::Debug for MastodonClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MastodonClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl MastodonClient {
    pub fn from_config(source: &Mastodon) -> Result<Self, FetchError> {
        Self::with_base_url(&source.api_base_url, source.access_token.clone())
    }

    pub fn with_base_url(base_url: &str, access_token: String) -> Result<Self, FetchError> {
        // A trailing slash keeps `join` from dropping the last path segment.
        let base = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&base).map_err(|e| FetchError::Url(e.to_string()))?;
        let http = Client::builder()
            .user_agent(concat!("toot-mirror/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url,
            access_token,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| FetchError::Url(e.to_string()))?;
        debug!(%url, "mastodon GET");

        let res = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(FetchError::Http { status, body });
        }
        Ok(res.json::<T>().await?)
    }
}

#[async_trait]
impl Timeline for MastodonClient {
    async fn verify_credentials(&self) -> Result<Account, FetchError> {
        self.get("api/v1/accounts/verify_credentials", &[]).await
    }

    async fn fetch_recent(
        &self,
        account_id: &str,
        limit: u32,
        since: Option<&PostId>,
    ) -> Result<Vec<SourcePost>, FetchError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(since) = since {
            query.push(("since_id", since.to_string()));
        }
        let statuses: Vec<Status> = self
            .get(&format!("api/v1/accounts/{}/statuses", account_id), &query)
            .await?;
        debug!(account_id = %account_id, count = statuses.len(), "fetched statuses");

        let mut posts: Vec<SourcePost> = statuses
            .into_iter()
            .map(|s| s.into_source_post(account_id))
            .collect();
        posts.sort_by(|a, b| b.id.cmp(&a.id));
        posts.truncate(limit as usize);
        Ok(posts)
    }
}

#[derive(Debug, Deserialize)]
struct StatusAccount {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Status {
    id: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    content: String,
    url: Option<String>,
    uri: String,
    visibility: Visibility,
    in_reply_to_id: Option<String>,
    in_reply_to_account_id: Option<String>,
    reblog: Option<Box<Status>>,
    #[serde(default)]
    media_attachments: Vec<serde_json::Value>,
    account: StatusAccount,
}

impl Status {
    fn permalink(&self) -> String {
        self.url.clone().unwrap_or_else(|| self.uri.clone())
    }

    fn into_source_post(self, owner_id: &str) -> SourcePost {
        // A boost has no content of its own; mirror what was boosted.
        let (text, url, has_media) = match &self.reblog {
            Some(boosted) => (
                text::html_to_text(&boosted.content),
                boosted.permalink(),
                !boosted.media_attachments.is_empty(),
            ),
            None => (
                text::html_to_text(&self.content),
                self.permalink(),
                !self.media_attachments.is_empty(),
            ),
        };
        let reply_to_self = self.in_reply_to_account_id.as_deref() == Some(owner_id)
            && self.account.id == owner_id;

        SourcePost {
            id: PostId::new(self.id),
            created_at: self.created_at,
            text,
            url,
            visibility: self.visibility,
            has_media,
            is_reply: self.in_reply_to_id.is_some(),
            reply_to_self,
            in_reply_to_id: self.in_reply_to_id.map(PostId::new),
            is_boost: self.reblog.is_some(),
            boost_of: self.reblog.map(|boosted| PostId::new(boosted.id)),
        }
    }
}
