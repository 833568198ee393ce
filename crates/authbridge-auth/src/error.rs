//! Redirect-chain error taxonomy.
//!
//! Handlers map every failure in the chained flow onto one of two wire
//! errors: `invalid_request` for anything caught before talking to a
//! provider (missing parameters, bad state, nonce mismatch) and
//! `invalid_token` for exchanges or lookups that broke upstream. The
//! predicates here make that mapping explicit instead of leaving it to
//! per-handler match arms.

use crate::github::UserLookupError;
use crate::id_token::IdTokenError;
use crate::oauth::ExchangeError;

/// Errors from the state-bound redirect chain.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// A required callback parameter was missing or empty.
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// The state parameter could not be decoded.
    #[error("Malformed state parameter")]
    MalformedState,

    /// The state nonce did not match the flow cookie.
    #[error("State does not match the flow cookie")]
    StateMismatch,

    /// The identity token failed validation.
    #[error(transparent)]
    IdToken(#[from] IdTokenError),

    /// The authorization-code exchange failed.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// The user identity lookup failed.
    #[error(transparent)]
    UserLookup(#[from] UserLookupError),
}

impl FlowError {
    /// Returns `true` when the failure is a precondition caught before any
    /// provider was called, which maps to the `invalid_request` wire error.
    /// Upstream failures map to `invalid_token`.
    #[must_use]
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter(_) | Self::MalformedState | Self::StateMismatch
        )
    }

    /// Wire error code for the JSON error body.
    #[must_use]
    pub fn wire_code(&self) -> &'static str {
        if self.is_invalid_request() {
            "invalid_request"
        } else {
            "invalid_token"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameter_is_invalid_request() {
        let err = FlowError::MissingParameter("code");
        assert!(err.is_invalid_request());
        assert_eq!(err.wire_code(), "invalid_request");
    }

    #[test]
    fn test_state_mismatch_is_invalid_request() {
        let err = FlowError::StateMismatch;
        assert!(err.is_invalid_request());
        assert_eq!(err.wire_code(), "invalid_request");
    }

    #[test]
    fn test_upstream_failure_is_invalid_token() {
        let err = FlowError::Exchange(ExchangeError::NetworkError("timeout".to_string()));
        assert_eq!(err.wire_code(), "invalid_token");
    }
}
