//! OpenID Connect discovery client and per-issuer cache.
//!
//! Resolves `{issuer}/.well-known/openid-configuration` to the provider
//! metadata we need (currently only `jwks_uri`) and caches the result per
//! issuer for the lifetime of the process. There is deliberately no TTL or
//! invalidation: a cached document is trusted until restart, mirroring the
//! fetch-once policy of the key caches that build on it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

/// Configuration for the discovery cache.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// HTTP request timeout (default: 10 seconds).
    pub request_timeout: Duration,

    /// Whether to allow HTTP (non-HTTPS) issuer URLs.
    /// This should only be enabled for testing.
    pub allow_http: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            allow_http: false,
        }
    }
}

impl DiscoveryConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Allows HTTP (non-HTTPS) issuer URLs.
    ///
    /// # Warning
    ///
    /// This should only be used for testing.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }
}

/// Errors that can occur during OIDC discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A network error occurred while fetching the discovery document.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The discovery document could not be parsed as JSON.
    #[error("Failed to parse discovery document: {0}")]
    ParseError(String),

    /// The `jwks_uri` field is missing or not a valid URL.
    #[error("Invalid jwks_uri in discovery document: {0}")]
    InvalidJwksUri(String),

    /// The issuer URL scheme is not allowed (must be HTTPS in production).
    #[error("Invalid URL scheme: only HTTPS is allowed")]
    InvalidScheme,
}

/// The subset of the OIDC discovery document this service consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier as published by the provider.
    pub issuer: Option<String>,

    /// URI of the provider's JSON Web Key Set.
    pub jwks_uri: String,
}

/// Per-issuer cache of OIDC discovery documents.
///
/// Fetch-on-miss, then permanent for the process lifetime. Concurrent misses
/// for the same issuer may both fetch; the last write wins, which is
/// harmless because the document is immutable from our point of view. A
/// half-written entry is never observable: entries are inserted fully formed
/// under the write lock.
pub struct DiscoveryCache {
    http_client: reqwest::Client,
    cache: Arc<RwLock<HashMap<String, Arc<DiscoveryDocument>>>>,
    config: DiscoveryConfig,
}

impl DiscoveryCache {
    /// Creates a new discovery cache with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(config: DiscoveryConfig) -> Self {
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

    /// Creates a new discovery cache with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DiscoveryConfig::default())
    }

    /// Returns the discovery document for an issuer, fetching it on first
    /// use.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer scheme is not allowed, the fetch
    /// fails, or the document cannot be parsed.
    pub async fn get(&self, issuer: &Url) -> Result<Arc<DiscoveryDocument>, DiscoveryError> {
        let key = normalize_issuer(issuer);

        {
            let cache = self.cache.read().await;
            if let Some(doc) = cache.get(&key) {
                tracing::trace!(issuer = %key, "discovery cache hit");
                return Ok(Arc::clone(doc));
            }
        }

        let doc = Arc::new(self.fetch(issuer).await?);

        let mut cache = self.cache.write().await;
        let entry = cache.entry(key).or_insert_with(|| Arc::clone(&doc));
        Ok(Arc::clone(entry))
    }

    /// Resolves the `jwks_uri` for an issuer.
    pub async fn jwks_uri(&self, issuer: &Url) -> Result<Url, DiscoveryError> {
        let doc = self.get(issuer).await?;
        Url::parse(&doc.jwks_uri).map_err(|e| DiscoveryError::InvalidJwksUri(e.to_string()))
    }

    async fn fetch(&self, issuer: &Url) -> Result<DiscoveryDocument, DiscoveryError> {
        self.validate_scheme(issuer)?;

        let discovery_url = build_discovery_url(issuer);
        tracing::debug!(issuer = %issuer, url = %discovery_url, "fetching OIDC discovery document");

        let response = self
            .http_client
            .get(discovery_url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(issuer = %issuer, error = %e, "failed to fetch OIDC discovery");
                DiscoveryError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(DiscoveryError::HttpError(response.status().as_u16()));
        }

        let doc: DiscoveryDocument = response
            .json()
            .await
            .map_err(|e| DiscoveryError::ParseError(e.to_string()))?;

        tracing::debug!(issuer = %issuer, jwks_uri = %doc.jwks_uri, "cached discovery document");
        Ok(doc)
    }

    fn validate_scheme(&self, issuer: &Url) -> Result<(), DiscoveryError> {
        match issuer.scheme() {
            "https" => Ok(()),
            "http" if self.config.allow_http => Ok(()),
            _ => Err(DiscoveryError::InvalidScheme),
        }
    }
}

/// Builds the well-known discovery URL for an issuer.
fn build_discovery_url(issuer: &Url) -> Url {
    let base = issuer.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/.well-known/openid-configuration"))
        .expect("issuer URL with well-known suffix is valid")
}

/// Normalizes an issuer URL for use as a cache key.
fn normalize_issuer(issuer: &Url) -> String {
    issuer.as_str().trim_end_matches('/').to_string()
}
