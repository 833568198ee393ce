//! Authorization-code flow client for the chained providers.
//!
//! Builds authorization URLs and exchanges authorization codes for tokens
//! against either provider. Token endpoints differ in how they answer:
//! provider A (GitHub) returns `application/x-www-form-urlencoded` by
//! default while provider B (Entra ID) returns JSON, so the response is
//! decoded by an explicit content-type match rather than field probing.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Errors from authorization-code exchange.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// A network error occurred while calling the token endpoint.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The token endpoint returned a non-success status code.
    #[error("Token exchange failed: HTTP {status} - {body}")]
    HttpError {
        /// Status code returned by the token endpoint.
        status: u16,
        /// Response body, for the log only.
        body: String,
    },

    /// The token endpoint returned a structured OAuth error.
    #[error("OAuth error from provider: {error} - {description}")]
    OAuthError {
        /// The OAuth error code.
        error: String,
        /// Optional error description.
        description: String,
    },

    /// The token response could not be decoded.
    #[error("Failed to parse token response: {0}")]
    ParseError(String),

    /// The token endpoint answered with a content type we do not decode.
    #[error("Unsupported token response content type: {0}")]
    UnsupportedContentType(String),
}

/// Endpoint and client configuration for one OAuth2 provider.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    /// Authorization endpoint the browser is redirected to.
    pub authorize_endpoint: Url,

    /// Token endpoint for the code exchange.
    pub token_endpoint: Url,

    /// OAuth2 client id.
    pub client_id: String,

    /// OAuth2 client secret.
    pub client_secret: String,

    /// Redirect URI registered with the provider.
    pub redirect_uri: Url,

    /// Space-separated scope string, if the provider wants one.
    pub scope: Option<String>,

    /// Extra query parameters for the authorization URL
    /// (e.g. `response_mode=query` for Entra ID).
    pub extra_auth_params: Vec<(String, String)>,
}

impl ProviderEndpoints {
    /// Builds the authorization URL for a redirect, with the given `state`
    /// and optional OIDC `nonce`.
    #[must_use]
    pub fn authorization_url(&self, state: &str, nonce: Option<&str>) -> Url {
        let mut url = self.authorize_endpoint.clone();
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("client_id", &self.client_id);
            params.append_pair("response_type", "code");
            params.append_pair("redirect_uri", self.redirect_uri.as_str());
            if let Some(scope) = &self.scope {
                params.append_pair("scope", scope);
            }
            params.append_pair("state", state);
            if let Some(nonce) = nonce {
                params.append_pair("nonce", nonce);
            }
            for (key, value) in &self.extra_auth_params {
                params.append_pair(key, value);
            }
        }
        url
    }
}

/// Token response from a provider's token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: String,

    /// The token type (usually "bearer").
    pub token_type: String,

    /// Token lifetime in seconds. GitHub's OAuth tokens omit this.
    pub expires_in: Option<u64>,

    /// Optional refresh token.
    pub refresh_token: Option<String>,

    /// Granted scopes.
    pub scope: Option<String>,

    /// OIDC ID token, when the provider issues one.
    pub id_token: Option<String>,
}

/// OAuth error response body.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Client for authorization-code exchanges.
#[derive(Clone)]
pub struct OAuthClient {
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates a client with the given outbound timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(request_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { http_client }
    }

    /// Exchanges an authorization code for a token.
    ///
    /// # Errors
    ///
    /// Returns an error when the call fails, the endpoint answers
    /// non-success or with a structured OAuth error, or the body cannot be
    /// decoded.
    pub async fn exchange_code(
        &self,
        provider: &ProviderEndpoints,
        code: &str,
    ) -> Result<TokenResponse, ExchangeError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", provider.redirect_uri.as_str()),
            ("client_id", &provider.client_id),
            ("client_secret", &provider.client_secret),
        ];

        tracing::debug!(endpoint = %provider.token_endpoint, "exchanging authorization code");

        let response = self
            .http_client
            .post(provider.token_endpoint.as_str())
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_string())
            .unwrap_or_default();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            if let Ok(oauth_error) = serde_json::from_str::<OAuthErrorResponse>(&body) {
                return Err(ExchangeError::OAuthError {
                    error: oauth_error.error,
                    description: oauth_error.error_description.unwrap_or_default(),
                });
            }
            return Err(ExchangeError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        decode_token_response(&content_type, &body)
    }
}

/// Decodes a token response body according to its content type.
fn decode_token_response(content_type: &str, body: &str) -> Result<TokenResponse, ExchangeError> {
    match content_type {
        "application/json" => {
            // GitHub signals errors with 200 + an error body; catch it here.
            if let Ok(oauth_error) = serde_json::from_str::<OAuthErrorResponse>(body) {
                return Err(ExchangeError::OAuthError {
                    error: oauth_error.error,
                    description: oauth_error.error_description.unwrap_or_default(),
                });
            }
            serde_json::from_str(body).map_err(|e| ExchangeError::ParseError(e.to_string()))
        }
        "application/x-www-form-urlencoded" => decode_form_token_response(body),
        other => Err(ExchangeError::UnsupportedContentType(other.to_string())),
    }
}

/// Decodes the form-urlencoded variant GitHub's token endpoint emits.
fn decode_form_token_response(body: &str) -> Result<TokenResponse, ExchangeError> {
    let mut access_token = None;
    let mut token_type = None;
    let mut expires_in = None;
    let mut refresh_token = None;
    let mut scope = None;
    let mut id_token = None;
    let mut error = None;
    let mut error_description = None;

    for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "token_type" => token_type = Some(value.into_owned()),
            "expires_in" => expires_in = value.parse().ok(),
            "refresh_token" => refresh_token = Some(value.into_owned()),
            "scope" => scope = Some(value.into_owned()),
            "id_token" => id_token = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(ExchangeError::OAuthError {
            error,
            description: error_description.unwrap_or_default(),
        });
    }

    Ok(TokenResponse {
        access_token: access_token
            .ok_or_else(|| ExchangeError::ParseError("missing access_token".to_string()))?,
        token_type: token_type.unwrap_or_else(|| "bearer".to_string()),
        expires_in,
        refresh_token,
        scope,
        id_token,
    })
}
