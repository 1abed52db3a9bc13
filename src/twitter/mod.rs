use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::Twitter;

pub mod oauth;

use oauth::OAuthSigner;

/// Write side of the destination account.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Create a post and return its destination id.
    async fn create_post(&self, text: &str, in_reply_to: Option<&str>) -> Result<String>;

    /// Re-share an existing destination post. Returns the id to pair with
    /// the source boost.
    async fn repost(&self, destination_id: &str) -> Result<String>;
}

pub struct TwitterClient {
    http: Client,
    base_url: Url,
    signer: OAuthSigner,
    user_id: Option<String>,
}

impl fmt::Debug for TwitterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitterClient")
            .field("base_url", &self.base_url)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
pub struct CreateTweetRequest<'a> {
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<TweetReply<'a>>,
}

#[derive(Debug, Serialize)]
pub struct TweetReply<'a> {
    pub in_reply_to_tweet_id: &'a str,
}

#[derive(Debug, Serialize)]
struct RetweetRequest<'a> {
    tweet_id: &'a str,
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: CreatedTweet,
}

#[derive(Deserialize)]
struct CreatedTweet {
    id: String,
}

#[derive(Deserialize)]
struct RetweetResponse {
    data: RetweetStatus,
}

#[derive(Deserialize)]
struct RetweetStatus {
    retweeted: bool,
}

/// OAuth 1.0a access tokens are issued as `<user id>-<secret part>`.
fn user_id_from_token(access_token: &str) -> Option<String> {
    let (prefix, _) = access_token.split_once('-')?;
    (!prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit())).then(|| prefix.to_string())
}

impl TwitterClient {
    pub fn from_config(cfg: &Twitter) -> Result<Self> {
        let base = format!("{}/", cfg.api_base_url.trim_end_matches('/'));
        let base_url = Url::parse(&base).context("invalid Twitter base URL")?;
        let http = Client::builder()
            .user_agent(concat!("toot-mirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            signer: OAuthSigner::new(cfg),
            user_id: cfg
                .user_id
                .clone()
                .or_else(|| user_id_from_token(&cfg.access_token)),
        })
    }

    fn signed_post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(path)
            .context("invalid Twitter base URL")?;
        let auth = self.signer.authorization("POST", endpoint.as_str(), &[])?;
        self.http
            .post(endpoint)
            .header("Authorization", auth)
            .json(body)
            .build()
            .context("failed to build Twitter request")
    }

    pub fn build_request(&self, body: &CreateTweetRequest<'_>) -> Result<reqwest::Request> {
        self.signed_post("2/tweets", body)
    }

    pub fn build_retweet_request(&self, tweet_id: &str) -> Result<reqwest::Request> {
        let user_id = self
            .user_id
            .as_deref()
            .ok_or_else(|| anyhow!("cannot retweet: destination.user_id is not configured"))?;
        self.signed_post(
            &format!("2/users/{}/retweets", user_id),
            &RetweetRequest { tweet_id },
        )
    }

    async fn send(&self, request: reqwest::Request) -> Result<Response> {
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Twitter")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("received 429 from Twitter: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("twitter error {}: {}", status, body));
        }
        Ok(res)
    }

    pub async fn create_tweet(&self, text: &str, in_reply_to: Option<&str>) -> Result<String> {
        let body = CreateTweetRequest {
            text,
            reply: in_reply_to.map(|id| TweetReply {
                in_reply_to_tweet_id: id,
            }),
        };
        let request = self.build_request(&body)?;
        debug!(url = %request.url(), reply_to = ?in_reply_to, "sending tweet");

        let payload: CreateTweetResponse = self
            .send(request)
            .await?
            .json()
            .await
            .context("invalid Twitter response")?;
        Ok(payload.data.id)
    }

    /// Retweet `tweet_id` as the configured user. Returns `tweet_id`; the v2
    /// endpoint reports no id for the retweet itself.
    pub async fn retweet(&self, tweet_id: &str) -> Result<String> {
        let request = self.build_retweet_request(tweet_id)?;
        debug!(url = %request.url(), tweet_id, "sending retweet");

        let payload: RetweetResponse = self
            .send(request)
            .await?
            .json()
            .await
            .context("invalid Twitter response")?;
        if !payload.data.retweeted {
            bail!("Twitter did not retweet {}", tweet_id);
        }
        Ok(tweet_id.to_string())
    }
}

#[async_trait]
impl Destination for TwitterClient {
    async fn create_post(&self, text: &str, in_reply_to: Option<&str>) -> Result<String> {
        self.create_tweet(text, in_reply_to).await
    }

    async fn repost(&self, destination_id: &str) -> Result<String> {
        self.retweet(destination_id).await
    }
}
