//! State-bound redirect chain: `/preauth`, `/postauth-github`,
//! `/postauth-entra`.
//!
//! Each hop carries a nonce in a per-stage cookie and in the provider's
//! `state` parameter; the hop is accepted only when both sides agree. The
//! second hop additionally carries the external user id in the state, which
//! becomes the token-store key.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use cookie::{Cookie, SameSite};
use serde::Deserialize;
use serde_json::json;

use authbridge_auth::{FlowError, FlowState};
use authbridge_storage::TokenRecord;

use crate::state::AppState;

/// Cookie holding the stage-A (GitHub) nonce.
pub const STATE_COOKIE_GITHUB: &str = "oauth_state_github";
/// Cookie holding the stage-B (Entra ID) nonce.
pub const STATE_COOKIE_ENTRA: &str = "oauth_state_entra";

/// Confirmation shown in the browser after the chain completes.
const COMPLETION_MESSAGE: &str =
    "Authorized and mapped accounts. You can now return to your Copilot Chat.";

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

fn state_cookie(name: &'static str, nonce: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, nonce))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}

// `302 Found`, the status the OAuth2 providers' own flows answer with.
fn found(location: &url::Url) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

fn error_json(code: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": code}))).into_response()
}

fn require_param<'a>(
    value: &'a Option<String>,
    name: &'static str,
) -> Result<&'a str, FlowError> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(FlowError::MissingParameter(name)),
    }
}

/// `GET /preauth` - entry point of the chain. Mints the stage-A nonce and
/// redirects the browser to the GitHub authorization page.
pub async fn preauth(State(state): State<AppState>, jar: CookieJar) -> Response {
    let flow = FlowState::generate();
    let auth_url = state.github.authorization_url(&flow.encode(), None);
    tracing::debug!(url = %auth_url, "redirecting to provider A authorization URL");

    let jar = jar.add(state_cookie(
        STATE_COOKIE_GITHUB,
        flow.nonce,
        state.secure_cookies,
    ));
    (jar, found(&auth_url)).into_response()
}

/// `GET /postauth-github` - stage-A callback. Validates the nonce, exchanges
/// the code, resolves the external user id, and redirects to the Entra ID
/// authorization page with the user id folded into the new state.
pub async fn postauth_github(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    match github_hop(&state, jar, &params).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "provider A callback rejected");
            error_json(err.wire_code())
        }
    }
}

async fn github_hop(
    state: &AppState,
    jar: CookieJar,
    params: &CallbackParams,
) -> Result<Response, FlowError> {
    let code = require_param(&params.code, "code")?;
    let raw_state = require_param(&params.state, "state")?;
    let flow = FlowState::decode(raw_state).ok_or(FlowError::MalformedState)?;
    let cookie_nonce = jar.get(STATE_COOKIE_GITHUB).map(|c| c.value().to_string());
    if !flow.matches_cookie(cookie_nonce.as_deref()) {
        return Err(FlowError::StateMismatch);
    }

    let token = state.oauth.exchange_code(&state.github, code).await?;
    let user_id = state.github_users.user_id(&token.access_token).await?;
    tracing::debug!(user_id = %user_id, "resolved external user id");

    let next = FlowState::generate_with_correlation(user_id);
    let auth_url = state.entra.authorization_url(&next.encode(), Some(&next.nonce));
    tracing::debug!(url = %auth_url, "redirecting to provider B authorization URL");

    let jar = jar
        .remove(removal_cookie(STATE_COOKIE_GITHUB))
        .add(state_cookie(
            STATE_COOKIE_ENTRA,
            next.nonce,
            state.secure_cookies,
        ));
    Ok((jar, found(&auth_url)).into_response())
}

/// `GET /postauth-entra` - stage-B callback. Validates the nonce, exchanges
/// the code, and stores the token record under the external user id carried
/// by the state.
///
/// Every rejection answers `400 {"error":"invalid_request"}`, including a
/// failed exchange; the browser-facing page has no use for finer detail.
pub async fn postauth_entra(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    match entra_hop(&state, jar, &params).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "provider B callback rejected");
            error_json("invalid_request")
        }
    }
}

async fn entra_hop(
    state: &AppState,
    jar: CookieJar,
    params: &CallbackParams,
) -> Result<Response, FlowError> {
    let code = require_param(&params.code, "code")?;
    let raw_state = require_param(&params.state, "state")?;
    let flow = FlowState::decode(raw_state).ok_or(FlowError::MalformedState)?;
    // Stage B must carry the user id minted by stage A.
    let user_id = flow
        .correlation_id
        .clone()
        .ok_or(FlowError::MalformedState)?;
    let cookie_nonce = jar.get(STATE_COOKIE_ENTRA).map(|c| c.value().to_string());
    if !flow.matches_cookie(cookie_nonce.as_deref()) {
        return Err(FlowError::StateMismatch);
    }

    let token = state.oauth.exchange_code(&state.entra, code).await?;
    let record = TokenRecord::new(
        token.access_token,
        token.token_type,
        token.expires_in.unwrap_or(0),
        token.refresh_token,
    );

    if let Err(err) = state.tokens.put(&user_id, record).await {
        tracing::error!(error = %err, user_id = %user_id, "failed to store token record");
        return Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "server_error"})),
        )
            .into_response());
    }
    tracing::info!(user_id = %user_id, "accounts mapped, token stored");

    let jar = jar.remove(removal_cookie(STATE_COOKIE_ENTRA));
    Ok((jar, (StatusCode::ACCEPTED, COMPLETION_MESSAGE)).into_response())
}
