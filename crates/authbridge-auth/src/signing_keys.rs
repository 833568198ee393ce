//! Cache for detached verification keys published as a rotating list.
//!
//! GitHub publishes the public keys used to sign webhook-style requests as a
//! JSON list of `{key_identifier, key}` entries at a well-known endpoint,
//! where `key` is a PEM blob. This module fetches that list on the first
//! lookup of an unknown key id, strips the PEM armor, base64-decodes to DER,
//! and caches the result per key id for the lifetime of the process. A key
//! id missing from the fetched list is a hard failure, not a retry
//! condition.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

/// Configuration for the signing-key cache.
#[derive(Debug, Clone)]
pub struct SigningKeyConfig {
    /// Endpoint returning the current key list.
    pub keys_endpoint: Url,

    /// HTTP request timeout (default: 10 seconds).
    pub request_timeout: Duration,

    /// User-Agent header for the key-fetch call. GitHub rejects requests
    /// without one.
    pub user_agent: String,
}

impl SigningKeyConfig {
    /// Creates a configuration for the given keys endpoint.
    #[must_use]
    pub fn new(keys_endpoint: Url) -> Self {
        Self {
            keys_endpoint,
            request_timeout: Duration::from_secs(10),
            user_agent: "authbridge".to_string(),
        }
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the User-Agent header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Errors that can occur while resolving a verification key.
#[derive(Debug, thiserror::Error)]
pub enum SigningKeyError {
    /// A network error occurred while fetching the key list.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The key list could not be parsed.
    #[error("Failed to parse key list: {0}")]
    ParseError(String),

    /// The requested key id was not in the fetched list.
    #[error("Key {0} not found in public keys")]
    KeyNotFound(String),

    /// The key material was not valid base64.
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),
}

/// One entry of the published key list.
#[derive(Debug, Deserialize)]
struct PublicKeyEntry {
    key_identifier: String,
    key: String,
}

/// Wire shape of the keys endpoint response.
#[derive(Debug, Deserialize)]
struct PublicKeysResponse {
    public_keys: Vec<PublicKeyEntry>,
}

/// Per-key-id cache of DER-encoded verification keys.
///
/// Fetch-on-miss, then permanent for the process lifetime. Rotated keys are
/// only picked up by a restart; this matches the upstream contract that a
/// key id, once published, never changes meaning.
pub struct SigningKeyCache {
    http_client: reqwest::Client,
    cache: Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>,
    config: SigningKeyConfig,
}

impl SigningKeyCache {
    /// Creates a new signing-key cache.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(config: SigningKeyConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            cache: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Returns the DER-encoded public key for `key_id`.
    ///
    /// `bearer_token`, when present, is forwarded on the fetch call to lift
    /// the anonymous rate limit; it has no effect on a cache hit.
    ///
    /// # Errors
    ///
    /// Returns [`SigningKeyError::KeyNotFound`] if the fetched list has no
    /// entry for `key_id`, or a fetch/parse error.
    pub async fn get_key(
        &self,
        key_id: &str,
        bearer_token: Option<&str>,
    ) -> Result<Arc<Vec<u8>>, SigningKeyError> {
        {
            let cache = self.cache.read().await;
            if let Some(key) = cache.get(key_id) {
                tracing::trace!(key_id = %key_id, "signing key cache hit");
                return Ok(Arc::clone(key));
            }
        }

        let fetched = self.fetch_keys(bearer_token).await?;

        let mut cache = self.cache.write().await;
        for (id, der) in fetched {
            cache.entry(id).or_insert_with(|| Arc::new(der));
        }

        cache
            .get(key_id)
            .map(Arc::clone)
            .ok_or_else(|| SigningKeyError::KeyNotFound(key_id.to_string()))
    }

    /// Fetches and decodes the full key list.
    async fn fetch_keys(
        &self,
        bearer_token: Option<&str>,
    ) -> Result<Vec<(String, Vec<u8>)>, SigningKeyError> {
        tracing::debug!(endpoint = %self.config.keys_endpoint, "fetching public key list");

        let mut request = self
            .http_client
            .get(self.config.keys_endpoint.as_str())
            .header("User-Agent", &self.config.user_agent)
            .header("Accept", "application/json");
        if let Some(token) = bearer_token.filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, "failed to fetch public key list");
            SigningKeyError::NetworkError(e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(SigningKeyError::HttpError(response.status().as_u16()));
        }

        let body: PublicKeysResponse = response
            .json()
            .await
            .map_err(|e| SigningKeyError::ParseError(e.to_string()))?;

        let mut keys = Vec::with_capacity(body.public_keys.len());
        for entry in body.public_keys {
            let der = decode_pem_ish(&entry.key)?;
            keys.push((entry.key_identifier, der));
        }

        tracing::debug!(count = keys.len(), "cached public key list");
        Ok(keys)
    }
}

/// Strips PEM armor lines and all whitespace, then base64-decodes the rest.
///
/// The upstream list publishes keys as PEM blobs with embedded newlines;
/// consumers only need the DER body.
fn decode_pem_ish(pem: &str) -> Result<Vec<u8>, SigningKeyError> {
    let body: String = pem
        .lines()
        .filter(|line| !line.contains("BEGIN") && !line.contains("END"))
        .flat_map(|line| line.chars())
        .filter(|c| !c.is_whitespace())
        .collect();

    BASE64
        .decode(body.as_bytes())
        .map_err(|e| SigningKeyError::InvalidKeyMaterial(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_DER_B64: &str = "AwVkZXI="; // arbitrary bytes, valid base64

    fn keys_body() -> serde_json::Value {
        serde_json::json!({
            "public_keys": [{
                "key_identifier": "key-a",
                "key": format!(
                    "-----BEGIN PUBLIC KEY-----\n{TEST_DER_B64}\n-----END PUBLIC KEY-----\n"
                ),
            }]
        })
    }

    fn cache_for(server: &MockServer) -> SigningKeyCache {
        let endpoint = Url::parse(&format!("{}/meta/public_keys", server.uri())).unwrap();
        SigningKeyCache::new(SigningKeyConfig::new(endpoint))
    }

    #[test]
    fn test_decode_pem_ish() {
        let pem = format!(
            "-----BEGIN PUBLIC KEY-----\r\n{TEST_DER_B64}\r\n-----END PUBLIC KEY-----"
        );
        let der = decode_pem_ish(&pem).unwrap();
        assert_eq!(der, BASE64.decode(TEST_DER_B64).unwrap());

        // Bare base64 without armor also decodes
        assert_eq!(decode_pem_ish(TEST_DER_B64).unwrap(), der);

        assert!(decode_pem_ish("!!!not base64!!!").is_err());
    }

    #[tokio::test]
    async fn test_fetch_once_then_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/meta/public_keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(keys_body()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache_for(&server);
        let first = cache.get_key("key-a", None).await.unwrap();
        let second = cache.get_key("key-a", None).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_key_id_is_hard_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/meta/public_keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(keys_body()))
            .mount(&server)
            .await;

        let cache = cache_for(&server);
        let err = cache.get_key("abc", None).await.unwrap_err();
        assert!(matches!(err, SigningKeyError::KeyNotFound(ref id) if id == "abc"));
    }

    #[tokio::test]
    async fn test_bearer_token_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/meta/public_keys"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(keys_body()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache_for(&server);
        cache.get_key("key-a", Some("gh-token")).await.unwrap();
    }

    #[tokio::test]
    async fn test_upstream_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/meta/public_keys"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let cache = cache_for(&server);
        let err = cache.get_key("key-a", None).await.unwrap_err();
        assert!(matches!(err, SigningKeyError::HttpError(429)));
    }
}
