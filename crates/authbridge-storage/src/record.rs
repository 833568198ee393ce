//! Serialized token record.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A stored token issued by the downstream identity provider.
///
/// The record captures the token response together with the moment it was
/// issued, so expiry can be judged at read time without a background
/// sweeper. Records serialize to a stable JSON shape; the store treats the
/// serialized form as opaque bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenRecord {
    /// The access token.
    pub access_token: String,

    /// The token type (usually "Bearer").
    pub token_type: String,

    /// Token lifetime in seconds at issue time. Zero means the provider
    /// gave no lifetime, and the record never expires on its own.
    pub expires_in: u64,

    /// Optional refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Unix timestamp (seconds) of the moment the record was created.
    pub issued_at: i64,
}

impl TokenRecord {
    /// Creates a record issued now.
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        expires_in: u64,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            expires_in,
            refresh_token,
            issued_at: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    /// Returns `true` when the token's lifetime has elapsed. A record at
    /// exactly `issued_at + expires_in` is still valid.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        if self.expires_in == 0 {
            return false;
        }
        let expires_at = self.issued_at.saturating_add(i64::try_from(self.expires_in).unwrap_or(i64::MAX));
        OffsetDateTime::now_utc().unix_timestamp() > expires_at
    }

    /// Seconds of lifetime left, saturating at zero.
    #[must_use]
    pub fn remaining_lifetime(&self) -> u64 {
        if self.expires_in == 0 {
            return 0;
        }
        let expires_at = self.issued_at.saturating_add(i64::try_from(self.expires_in).unwrap_or(i64::MAX));
        let now = OffsetDateTime::now_utc().unix_timestamp();
        u64::try_from(expires_at - now).unwrap_or(0)
    }
}
