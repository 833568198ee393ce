//! `POST /agent` - webhook entry point, guarded by GitHub's detached
//! payload signature.
//!
//! The raw body is verified against the ECDSA signature and key id carried
//! in headers before anything looks at the payload. The optional
//! `X-GitHub-Token` header is forwarded to the key fetch for rate-limit
//! exemption. Replies use the SSE-framed single-message shape the chat
//! client renders; downstream chat processing is a separate service.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

pub const KEY_IDENTIFIER_HEADER: &str = "x-github-public-key-identifier";
pub const SIGNATURE_HEADER: &str = "x-github-public-key-signature";
pub const GITHUB_TOKEN_HEADER: &str = "x-github-token";

pub async fn agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let key_id = header_str(&headers, KEY_IDENTIFIER_HEADER);
    let signature = header_str(&headers, SIGNATURE_HEADER);
    let bearer = headers
        .get(GITHUB_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    if !state.signatures.verify(&body, key_id, signature, bearer).await {
        tracing::error!(key_id = %key_id, "webhook signature verification failed");
        return sse_message(
            StatusCode::UNAUTHORIZED,
            "You are not a valid sender. Request unauthorized.",
        );
    }

    tracing::debug!(payload_bytes = body.len(), "webhook payload verified");
    sse_message(StatusCode::OK, "Request verified. Agent processing accepted.")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Frames a single assistant message the way the chat client expects:
/// one SSE data line followed by the done marker.
fn sse_message(status: StatusCode, message: &str) -> Response {
    let body = format!(
        "data: {{\"choices\":[{{\"finish_reason\":\"stop\",\"delta\":{{\"role\":\"assistant\",\"content\":\"{message}\"}}}}]}}\n\ndata: [DONE]"
    );
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}
