#![allow(dead_code)]

use authbridge_server::config::AppConfig;
use authbridge_server::{AppState, build_app};
use tokio::task::JoinHandle;
use wiremock::MockServer;

/// Starts the app on an ephemeral port and returns the base URL, the shared
/// state (for seeding the token store), and the shutdown handle.
pub async fn start_server(
    cfg: &AppConfig,
) -> (
    String,
    AppState,
    tokio::sync::oneshot::Sender<()>,
    JoinHandle<()>,
) {
    let state = AppState::from_config(cfg).expect("build state");
    let app = build_app(state.clone());

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), state, tx, server)
}

/// Config wired against two wiremock providers, with dev settings so plain
/// HTTP works end to end.
pub fn test_config(github: &MockServer, entra: &MockServer) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.server.base_url = Some("http://bridge.test".into());
    cfg.server.secure_cookies = false;
    cfg.server.allow_insecure_issuers = true;
    cfg.github.client_id = "Iv1.test".into();
    cfg.github.client_secret = "gh-secret".into();
    cfg.github.authorize_endpoint = format!("{}/login/oauth/authorize", github.uri());
    cfg.github.token_endpoint = format!("{}/login/oauth/access_token", github.uri());
    cfg.github.api_base = github.uri();
    cfg.github.keys_endpoint = format!("{}/meta/public_keys/copilot_api", github.uri());
    cfg.github.issuer = github.uri();
    cfg.entra.client_id = "entra-client".into();
    cfg.entra.client_secret = "entra-secret".into();
    cfg.entra.authorize_endpoint = Some(format!("{}/authorize", entra.uri()));
    cfg.entra.token_endpoint = Some(format!("{}/token", entra.uri()));
    cfg
}

/// Client that surfaces redirects instead of following them.
pub fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Extracts the value of a named Set-Cookie from a response.
pub fn cookie_value(resp: &reqwest::Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    resp.headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| {
            v.strip_prefix(&prefix)
                .map(|rest| rest.split(';').next().unwrap_or("").to_string())
        })
}

/// Extracts a query parameter from a response's Location header.
pub fn location_param(resp: &reqwest::Response, param: &str) -> Option<String> {
    let location = resp.headers().get("location")?.to_str().ok()?;
    let url = url::Url::parse(location).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == param)
        .map(|(_, v)| v.into_owned())
}
