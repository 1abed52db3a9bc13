//! OAuth 1.0a request signing for Twitter user-context endpoints.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::RngCore;
use sha1::Sha1;
use thiserror::Error;

use crate::config::Twitter;

/// RFC 3986 leaves only ALPHA / DIGIT / "-" / "." / "_" / "~" unescaped.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Error)]
#[error("OAuth signing failed: {0}")]
pub struct SigningError(String);

pub struct OAuthSigner {
    consumer_key: String,
    consumer_secret: String,
    access_token: String,
    access_token_secret: String,
}

impl std::fmt::Debug for OAuthSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSigner")
            .field("consumer_key", &self.consumer_key)
            .finish_non_exhaustive()
    }
}

impl OAuthSigner {
    pub fn new(cfg: &Twitter) -> Self {
        Self {
            consumer_key: cfg.consumer_key.clone(),
            consumer_secret: cfg.consumer_secret.clone(),
            access_token: cfg.access_token.clone(),
            access_token_secret: cfg.access_token_secret.clone(),
        }
    }

    /// `Authorization` header value for a request. `url` must not carry a
    /// query string; query and form parameters go in `params`. JSON bodies
    /// are not part of the signature.
    pub fn authorization(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<String, SigningError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.authorization_with(method, url, params, &generate_nonce(), &timestamp)
    }

    pub(crate) fn authorization_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> Result<String, SigningError> {
        let mut oauth_params = vec![
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp),
            ("oauth_token", self.access_token.as_str()),
            ("oauth_version", "1.0"),
        ];

        let mut signed: Vec<(String, String)> = oauth_params
            .iter()
            .chain(params.iter())
            .map(|(k, v)| (encode(k), encode(v)))
            .collect();
        signed.sort();
        let param_string = signed
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let base_string = format!(
            "{}&{}&{}",
            method.to_uppercase(),
            encode(url),
            encode(&param_string)
        );
        let signing_key = format!(
            "{}&{}",
            encode(&self.consumer_secret),
            encode(&self.access_token_secret)
        );
        let signature = hmac_sha1(&signing_key, &base_string)?;

        oauth_params.push(("oauth_signature", signature.as_str()));
        let header = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("OAuth {}", header))
    }
}

fn encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hmac_sha1(key: &str, data: &str) -> Result<String, SigningError> {
    let mut mac =
        Hmac::<Sha1>::new_from_slice(key.as_bytes()).map_err(|e| SigningError(e.to_string()))?;
    mac.update(data.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
