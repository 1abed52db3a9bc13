//! Best-effort expansion of shortened links in post text.
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use reqwest::header::LOCATION;
use reqwest::{redirect, Client, Url};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());

const HEAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Follows exactly one redirect hop per link with a HEAD request.
#[derive(Debug, Clone)]
pub struct LinkExpander {
    http: Client,
}

impl LinkExpander {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(HEAD_TIMEOUT)
            .user_agent(concat!("toot-mirror/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    /// Redirect target of `link`, or `None` when it does not redirect or the
    /// request fails.
    pub async fn resolve(&self, link: &str) -> Option<String> {
        let res = match self.http.head(link).send().await {
            Ok(res) => res,
            Err(err) => {
                warn!(link, error = %err, "HEAD request failed; keeping link");
                return None;
            }
        };
        if !res.status().is_redirection() {
            return None;
        }
        let location = res.headers().get(LOCATION)?.to_str().ok()?;
        // Location may be relative to the requested link.
        let target = Url::parse(link).ok()?.join(location).ok()?;
        Some(target.to_string())
    }

    /// `text` with every link that redirects replaced by its target.
    pub async fn expand(&self, text: &str) -> String {
        let mut resolved: HashMap<String, String> = HashMap::new();
        for link in LINK.find_iter(text).map(|m| m.as_str()) {
            if resolved.contains_key(link) {
                continue;
            }
            if let Some(target) = self.resolve(link).await {
                debug!(link, %target, "expanded link");
                resolved.insert(link.to_string(), target);
            }
        }
        if resolved.is_empty() {
            return text.to_string();
        }
        LINK.replace_all(text, |caps: &Captures| {
            resolved
                .get(&caps[0])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
    }
}
