//! Configuration loader and validator for the Mastodon→Twitter relay.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_TWITTER_API: &str = "https://api.twitter.com/";
/// Mastodon refuses `limit` values above this.
pub const MAX_FETCH_LIMIT: u32 = 40;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Cannot build {0} client: {1}")]
    Client(&'static str, String),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub source: Mastodon,
    pub destination: Twitter,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Mastodon credentials for the origin account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mastodon {
    pub api_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
}

/// Twitter OAuth 1.0a user-context credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Twitter {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
    #[serde(default = "default_twitter_api")]
    pub api_base_url: String,
    /// Numeric id of the destination account, needed to retweet. Taken
    /// from the access token prefix when unset.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// What happens when no state file exists yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColdStart {
    /// Record the newest fetched post as already synced; mirror nothing.
    #[default]
    Skip,
    /// Mirror every eligible post in the first fetch window.
    Backfill,
}

/// Relay behaviour. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
    pub fetch_limit: u32,
    pub cold_start: ColdStart,
    pub include_self_replies: bool,
    pub include_boosts: bool,
    pub include_media_posts: bool,
    pub thread_self_replies: bool,
    pub max_chars: usize,
    pub link_reserve: usize,
    pub max_mirrored: usize,
    pub escape_mentions: bool,
    /// Replace shortened links with their redirect target before posting.
    pub expand_links: bool,
    pub state_file: Option<PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            fetch_limit: 20,
            cold_start: ColdStart::Skip,
            include_self_replies: true,
            include_boosts: false,
            include_media_posts: true,
            thread_self_replies: false,
            max_chars: 280,
            link_reserve: 24,
            max_mirrored: 100,
            escape_mentions: true,
            expand_links: false,
            state_file: None,
        }
    }
}

fn default_twitter_api() -> String {
    DEFAULT_TWITTER_API.to_string()
}

/// Load configuration from a YAML file and validate it.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let src = &cfg.source;
    if src.api_base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("source.api_base_url must be non-empty"));
    }
    if reqwest::Url::parse(&src.api_base_url).is_err() {
        return Err(ConfigError::Invalid("source.api_base_url must be a valid URL"));
    }
    if src.client_id.trim().is_empty() {
        return Err(ConfigError::Invalid("source.client_id must be non-empty"));
    }
    if src.client_secret.trim().is_empty() {
        return Err(ConfigError::Invalid("source.client_secret must be non-empty"));
    }
    if src.access_token.trim().is_empty() {
        return Err(ConfigError::Invalid("source.access_token must be non-empty"));
    }

    let dst = &cfg.destination;
    if dst.consumer_key.trim().is_empty() {
        return Err(ConfigError::Invalid("destination.consumer_key must be non-empty"));
    }
    if dst.consumer_secret.trim().is_empty() {
        return Err(ConfigError::Invalid("destination.consumer_secret must be non-empty"));
    }
    if dst.access_token.trim().is_empty() {
        return Err(ConfigError::Invalid("destination.access_token must be non-empty"));
    }
    if dst.access_token_secret.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "destination.access_token_secret must be non-empty",
        ));
    }
    if dst.api_base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("destination.api_base_url must be non-empty"));
    }
    if reqwest::Url::parse(&dst.api_base_url).is_err() {
        return Err(ConfigError::Invalid("destination.api_base_url must be a valid URL"));
    }

    let sync = &cfg.sync;
    if sync.fetch_limit == 0 || sync.fetch_limit > MAX_FETCH_LIMIT {
        return Err(ConfigError::Invalid("sync.fetch_limit must be within 1..=40"));
    }
    // The body needs room for at least an ellipsis next to the link.
    if sync.link_reserve + 1 >= sync.max_chars {
        return Err(ConfigError::Invalid(
            "sync.max_chars must leave room beyond sync.link_reserve",
        ));
    }
    if sync.max_mirrored == 0 {
        return Err(ConfigError::Invalid("sync.max_mirrored must be > 0"));
    }

    Ok(())
}

/// Returns a sample configuration with every section filled in.
pub fn example() -> &'static str {
    r#"source:
  api_base_url: "https://mastodon.social"
  client_id: "MASTODON_CLIENT_ID"
  client_secret: "MASTODON_CLIENT_SECRET"
  access_token: "MASTODON_ACCESS_TOKEN"

destination:
  consumer_key: "TWITTER_CONSUMER_KEY"
  consumer_secret: "TWITTER_CONSUMER_SECRET"
  access_token: "TWITTER_ACCESS_TOKEN"
  access_token_secret: "TWITTER_ACCESS_TOKEN_SECRET"

sync:
  fetch_limit: 20
  cold_start: skip
  include_self_replies: true
  include_boosts: false
  thread_self_replies: false
  max_chars: 280
  link_reserve: 24
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = sample();
        validate(&cfg).unwrap();
        assert_eq!(cfg.destination.api_base_url, DEFAULT_TWITTER_API);
        assert_eq!(cfg.sync.max_mirrored, 100);
        assert!(cfg.sync.escape_mentions);
        assert!(!cfg.sync.expand_links);
        assert_eq!(cfg.destination.user_id, None);
    }

    #[test]
    fn sync_section_is_optional() {
        let yaml = example().split("sync:").next().unwrap();
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.sync, SyncSettings::default());
        validate(&cfg).unwrap();
    }

    #[test]
    fn missing_destination_section_fails_to_parse() {
        let yaml = example().split("destination:").next().unwrap();
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn invalid_source_token() {
        let mut cfg = sample();
        cfg.source.access_token = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("source.access_token")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_base_url() {
        let mut cfg = sample();
        cfg.source.api_base_url = "mastodon.social".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("valid URL")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_destination_secrets() {
        let mut cfg = sample();
        cfg.destination.consumer_secret = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = sample();
        cfg.destination.access_token_secret = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("access_token_secret")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_sync_bounds() {
        let mut cfg = sample();
        cfg.sync.fetch_limit = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = sample();
        cfg.sync.fetch_limit = 41;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = sample();
        cfg.sync.link_reserve = 280;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn cold_start_parses_lowercase() {
        let cfg: Config =
            serde_yaml::from_str(&example().replace("cold_start: skip", "cold_start: backfill"))
                .unwrap();
        assert_eq!(cfg.sync.cold_start, ColdStart::Backfill);
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("default.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(&p).unwrap();
        assert_eq!(cfg.source.api_base_url, "https://mastodon.social");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let td = tempdir().unwrap();
        let err = load(&td.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
