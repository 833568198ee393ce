//! Identity-token validation against an issuer's JWKS.
//!
//! Validates compact JWTs presented by the chat surface on the token
//! retrieval path: structural parse, `kid` header lookup through the JWKS
//! cache, then signature, issuer, audience, and expiry checks. The subject
//! claim is the external user id used as the token-store key.

use std::collections::HashMap;
use std::sync::Arc;

use jsonwebtoken::{Validation, decode_header};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::jwks::{JwksCache, JwksError};

/// Errors that can occur during identity-token validation.
#[derive(Debug, thiserror::Error)]
pub enum IdTokenError {
    /// The token is not a structurally valid compact JWT.
    #[error("Invalid id_token format: {0}")]
    Malformed(String),

    /// The token header carries no `kid`.
    #[error("ID token is missing key ID (kid) header")]
    MissingKeyId,

    /// The signing key could not be resolved.
    #[error("JWKS error: {0}")]
    JwksFailed(#[from] JwksError),

    /// Signature, issuer, audience, or lifetime validation failed.
    #[error("Token validation failed: {0}")]
    ValidationFailed(#[from] jsonwebtoken::errors::Error),

    /// The subject claim is empty.
    #[error("ID token has an empty subject")]
    EmptySubject,
}

impl IdTokenError {
    /// Returns `true` when the failure was caused by the caller's input
    /// rather than an upstream dependency.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::JwksFailed(JwksError::NetworkError(_) | JwksError::HttpError(_))
        )
    }
}

/// Claims extracted from a validated identity token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedClaims {
    /// Issuer identifier.
    pub iss: String,

    /// Subject identifier (the external user id).
    pub sub: String,

    /// Audience (string or array on the wire).
    #[serde(deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at time (Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,

    /// Extra claims not modeled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Validator for inbound identity tokens.
///
/// Holds the expected audience and issuer plus a shared [`JwksCache`]; one
/// instance serves all requests.
pub struct IdTokenValidator {
    jwks: Arc<JwksCache>,
    expected_audience: String,
    expected_issuer: Url,
}

impl IdTokenValidator {
    /// Creates a validator bound to one audience/issuer pair.
    #[must_use]
    pub fn new(jwks: Arc<JwksCache>, expected_audience: String, expected_issuer: Url) -> Self {
        Self {
            jwks,
            expected_audience,
            expected_issuer,
        }
    }

    /// Validates a compact identity token and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed tokens, unknown signing keys, and any
    /// signature/issuer/audience/expiry mismatch. `exp` must be in the
    /// future.
    pub async fn validate(&self, token: &str) -> Result<ValidatedClaims, IdTokenError> {
        let header = decode_header(token).map_err(|e| IdTokenError::Malformed(e.to_string()))?;
        let kid = header.kid.ok_or(IdTokenError::MissingKeyId)?;

        let (decoding_key, key_alg) = self.jwks.get_key(&self.expected_issuer, &kid).await?;
        let alg = key_alg.unwrap_or(header.alg);

        let mut validation = Validation::new(alg);
        validation.set_audience(&[&self.expected_audience]);
        validation.set_issuer(&[self.expected_issuer.as_str().trim_end_matches('/')]);

        let token_data = jsonwebtoken::decode::<ValidatedClaims>(token, &decoding_key, &validation)?;
        let claims = token_data.claims;

        if claims.sub.trim().is_empty() {
            return Err(IdTokenError::EmptySubject);
        }

        tracing::debug!(sub = %claims.sub, iss = %claims.iss, "validated identity token");
        Ok(claims)
    }
}

/// Custom deserializer for audience which can be a string or array.
fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}
