//! GitHub user identity lookup.
//!
//! After the first code exchange the bridge resolves the access token to a
//! stable numeric user id via the `/user` API. That id is the storage key
//! for the token issued by the second provider.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Errors from the GitHub user lookup.
#[derive(Debug, thiserror::Error)]
pub enum UserLookupError {
    /// A network error occurred while calling the API.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The API returned a non-success status code.
    #[error("User lookup failed: HTTP {0}")]
    HttpError(u16),

    /// The user payload could not be decoded.
    #[error("Failed to parse user response: {0}")]
    ParseError(String),
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: u64,
}

/// Client for resolving an access token to a GitHub user id.
#[derive(Clone)]
pub struct GitHubUserClient {
    api_base: Url,
    user_agent: String,
    http_client: reqwest::Client,
}

impl GitHubUserClient {
    /// Creates a client against the given API base URL.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(api_base: Url, user_agent: impl Into<String>, request_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            api_base,
            user_agent: user_agent.into(),
            http_client,
        }
    }

    /// Resolves the access token to the account's numeric user id.
    ///
    /// # Errors
    ///
    /// Returns an error when the call fails, the API rejects the token, or
    /// the payload cannot be decoded.
    pub async fn user_id(&self, access_token: &str) -> Result<String, UserLookupError> {
        let url = format!("{}/user", self.api_base.as_str().trim_end_matches('/'));

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .header("Accept", "application/vnd.github+json")
            // The GitHub API rejects requests without a User-Agent.
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| UserLookupError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UserLookupError::HttpError(response.status().as_u16()));
        }

        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| UserLookupError::ParseError(e.to_string()))?;

        Ok(user.id.to_string())
    }
}
