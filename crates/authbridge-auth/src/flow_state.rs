//! Nonce and correlation-id state for the redirect chain.
//!
//! Each redirect hop is bound to a per-session random nonce stored in a
//! protected cookie; the second hop additionally carries the external user
//! id discovered during the first hop inside the provider's `state`
//! parameter.
//!
//! Wire format: `"{nonce}"` for the first hop, `"{nonce}_{correlation_id}"`
//! for the second. The nonce is always a v4 UUID and therefore never
//! contains the separator, so decoding splits on the first underscore only
//! and any correlation id, including ones that contain underscores,
//! round-trips unmodified.

use uuid::Uuid;

/// Separator between the nonce and the correlation id in the `state` value.
pub const STATE_SEPARATOR: char = '_';

/// State carried through one redirect hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowState {
    /// Per-session random value, mirrored in the stage cookie.
    pub nonce: String,

    /// External user id riding through the second hop, if any.
    pub correlation_id: Option<String>,
}

impl FlowState {
    /// Mints a fresh state with a random nonce and no correlation id.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            nonce: Uuid::new_v4().to_string(),
            correlation_id: None,
        }
    }

    /// Mints a fresh state carrying a correlation id.
    #[must_use]
    pub fn generate_with_correlation(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Self::generate()
        }
    }

    /// Encodes the state for the provider's `state` query parameter.
    #[must_use]
    pub fn encode(&self) -> String {
        match &self.correlation_id {
            Some(id) => format!("{}{}{}", self.nonce, STATE_SEPARATOR, id),
            None => self.nonce.clone(),
        }
    }

    /// Decodes a `state` query value.
    ///
    /// Returns `None` when the value is empty or the nonce part is empty.
    /// Splits on the first separator only; everything after it is the
    /// correlation id, verbatim.
    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(2, STATE_SEPARATOR);
        let nonce = parts.next().unwrap_or_default();
        if nonce.trim().is_empty() {
            return None;
        }

        Some(Self {
            nonce: nonce.to_string(),
            correlation_id: parts.next().map(str::to_string),
        })
    }

    /// Checks this state's nonce against the value echoed in the stage
    /// cookie. Both must be present and non-empty.
    #[must_use]
    pub fn matches_cookie(&self, cookie_nonce: Option<&str>) -> bool {
        match cookie_nonce {
            Some(cookie) if !cookie.trim().is_empty() => cookie == self.nonce,
            _ => false,
        }
    }
}
