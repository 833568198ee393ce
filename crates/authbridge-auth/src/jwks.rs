//! Per-issuer JWKS cache for identity-token validation.
//!
//! Resolves an issuer to its key set via OIDC discovery and caches the set
//! for the lifetime of the process. A key id that is absent from the fetched
//! set is a hard failure, not a retry condition: if the issuer rotates in a
//! new key, the service must be restarted to pick it up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use url::Url;

use crate::discovery::{DiscoveryCache, DiscoveryConfig, DiscoveryError};

/// Errors that can occur during JWKS operations.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    /// Discovery of the issuer metadata failed.
    #[error("Discovery failed: {0}")]
    DiscoveryFailed(#[from] DiscoveryError),

    /// A network error occurred while fetching the JWKS.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The JWKS response could not be parsed as JSON.
    #[error("Failed to parse JWKS: {0}")]
    ParseError(String),

    /// The requested key was not found in the issuer's key set.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The key could not be converted to a decoding key.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Per-issuer cache of JSON Web Key Sets.
///
/// Fetch-on-miss through the discovery cache, then permanent for the process
/// lifetime. Concurrent misses may over-fetch; entries are inserted fully
/// formed so a half-written set is never served.
pub struct JwksCache {
    http_client: reqwest::Client,
    discovery: Arc<DiscoveryCache>,
    cache: Arc<RwLock<HashMap<String, Arc<JwkSet>>>>,
}

impl JwksCache {
    /// Creates a new JWKS cache sharing the given discovery cache.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(discovery: Arc<DiscoveryCache>, request_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            discovery,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a cache with its own discovery cache, for standalone use.
    #[must_use]
    pub fn with_config(config: DiscoveryConfig) -> Self {
        let timeout = config.request_timeout;
        Self::new(Arc::new(DiscoveryCache::new(config)), timeout)
    }

    /// Returns the decoding key for `kid` published by `issuer`.
    ///
    /// The key set is fetched on the first lookup for an issuer and reused
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`JwksError::KeyNotFound`] if the cached (or freshly fetched)
    /// set has no key with the requested id, or a fetch/parse error.
    pub async fn get_key(
        &self,
        issuer: &Url,
        kid: &str,
    ) -> Result<(DecodingKey, Option<Algorithm>), JwksError> {
        let jwks = self.get_set(issuer).await?;

        let jwk = jwks
            .keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))
            .ok_or_else(|| {
                tracing::warn!(issuer = %issuer, kid = %kid, "kid not found in issuer JWKS");
                JwksError::KeyNotFound(kid.to_string())
            })?;

        let key = DecodingKey::from_jwk(jwk).map_err(|e| JwksError::InvalidKey(e.to_string()))?;
        Ok((key, jwk_algorithm(jwk)))
    }

    async fn get_set(&self, issuer: &Url) -> Result<Arc<JwkSet>, JwksError> {
        let key = issuer.as_str().trim_end_matches('/').to_string();

        {
            let cache = self.cache.read().await;
            if let Some(set) = cache.get(&key) {
                tracing::trace!(issuer = %key, "JWKS cache hit");
                return Ok(Arc::clone(set));
            }
        }

        let jwks_uri = self.discovery.jwks_uri(issuer).await?;
        let set = Arc::new(self.fetch(&jwks_uri).await?);

        let mut cache = self.cache.write().await;
        let entry = cache.entry(key).or_insert_with(|| Arc::clone(&set));
        Ok(Arc::clone(entry))
    }

    async fn fetch(&self, jwks_uri: &Url) -> Result<JwkSet, JwksError> {
        tracing::debug!(url = %jwks_uri, "fetching JWKS");

        let response = self
            .http_client
            .get(jwks_uri.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %jwks_uri, error = %e, "failed to fetch JWKS");
                JwksError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(JwksError::HttpError(response.status().as_u16()));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| JwksError::ParseError(e.to_string()))?;

        tracing::debug!(url = %jwks_uri, keys = jwks.keys.len(), "cached JWKS");
        Ok(jwks)
    }
}

/// Extracts the algorithm from a JWK, if it declares one we support.
fn jwk_algorithm(jwk: &jsonwebtoken::jwk::Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        jsonwebtoken::jwk::KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        jsonwebtoken::jwk::KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        jsonwebtoken::jwk::KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        jsonwebtoken::jwk::KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        jsonwebtoken::jwk::KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        jsonwebtoken::jwk::KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        jsonwebtoken::jwk::KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        jsonwebtoken::jwk::KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        jsonwebtoken::jwk::KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_jwks() -> serde_json::Value {
        serde_json::json!({
            "keys": [{
                "kty": "EC",
                "crv": "P-256",
                "kid": "key-1",
                "use": "sig",
                "alg": "ES256",
                "x": "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU",
                "y": "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0"
            }]
        })
    }

    async fn mock_issuer(server: &MockServer, jwks_expect: u64) {
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": server.uri(),
                "jwks_uri": format!("{}/jwks", server.uri()),
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(test_jwks()))
            .expect(jwks_expect)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_get_key_by_kid() {
        let server = MockServer::start().await;
        mock_issuer(&server, 1).await;

        let cache = JwksCache::with_config(DiscoveryConfig::default().with_allow_http(true));
        let issuer = Url::parse(&server.uri()).unwrap();

        let (_key, alg) = cache.get_key(&issuer, "key-1").await.unwrap();
        assert_eq!(alg, Some(Algorithm::ES256));
    }

    #[tokio::test]
    async fn test_unknown_kid_is_hard_failure_and_cache_holds() {
        let server = MockServer::start().await;
        // One fetch only: the second lookup must be answered from the cache
        // even though the kid is absent.
        mock_issuer(&server, 1).await;

        let cache = JwksCache::with_config(DiscoveryConfig::default().with_allow_http(true));
        let issuer = Url::parse(&server.uri()).unwrap();

        let err = cache.get_key(&issuer, "no-such-key").await.unwrap_err();
        assert!(matches!(err, JwksError::KeyNotFound(ref kid) if kid == "no-such-key"));

        let err = cache.get_key(&issuer, "no-such-key").await.unwrap_err();
        assert!(matches!(err, JwksError::KeyNotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_failure_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": server.uri(),
                "jwks_uri": format!("{}/jwks", server.uri()),
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cache = JwksCache::with_config(DiscoveryConfig::default().with_allow_http(true));
        let issuer = Url::parse(&server.uri()).unwrap();

        let err = cache.get_key(&issuer, "key-1").await.unwrap_err();
        assert!(matches!(err, JwksError::HttpError(500)));
    }
}
