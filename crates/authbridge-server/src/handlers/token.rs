//! `POST /token` - the chat extension trades a GitHub-issued id token for
//! the stored Entra ID access token.
//!
//! This path is chat-facing: the caller cannot surface HTTP errors to the
//! user, so every failure answers `200 {"error":"invalid_request"}` and the
//! chat layer prompts for re-authorization. Detail goes to the log only.

use axum::Form;
use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::state::AppState;

/// RFC 8693 issued token type for plain access tokens.
pub const ISSUED_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

#[derive(Debug, Deserialize)]
pub struct TokenExchangeRequest {
    /// The id token identifying the GitHub user.
    #[serde(default)]
    pub subject_token: Option<String>,
}

pub async fn token_exchange(
    State(state): State<AppState>,
    Form(request): Form<TokenExchangeRequest>,
) -> Json<Value> {
    Json(exchange(&state, request).await)
}

async fn exchange(state: &AppState, request: TokenExchangeRequest) -> Value {
    let Some(subject_token) = request
        .subject_token
        .filter(|t| !t.trim().is_empty())
    else {
        tracing::error!("token exchange request missing subject_token");
        return json!({"error": "invalid_request"});
    };

    let claims = match state.id_tokens.validate(&subject_token).await {
        Ok(claims) => claims,
        Err(err) => {
            tracing::error!(error = %err, "subject token rejected");
            return json!({"error": "invalid_request"});
        }
    };

    let record = match state.tokens.get(&claims.sub).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::warn!(user_id = %claims.sub, "no stored token, re-authorization required");
            return json!({"error": "invalid_request"});
        }
        Err(err) => {
            tracing::error!(error = %err, user_id = %claims.sub, "token store read failed");
            return json!({"error": "invalid_request"});
        }
    };

    json!({
        "access_token": record.access_token,
        "token_type": "Bearer",
        "issued_token_type": ISSUED_TOKEN_TYPE,
        "expires_in": record.remaining_lifetime(),
    })
}
