//! HTTP handlers.

use axum::Json;
use serde_json::{Value, json};

pub mod agent;
pub mod flow;
pub mod token;

/// Service banner.
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "authbridge",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Liveness probe.
pub async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
