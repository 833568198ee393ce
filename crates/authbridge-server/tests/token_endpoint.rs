//! Tests for `POST /token`: the chat-facing token exchange.

mod common;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::{start_server, test_config};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use p256::ecdsa::SigningKey;
use p256::pkcs8::EncodePrivateKey;
use serde_json::Value;
use time::OffsetDateTime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mounts discovery + JWKS endpoints on the provider mock and returns the
/// key that signs id tokens under kid "test-key".
async fn mount_issuer(server: &MockServer) -> EncodingKey {
    let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
    let point = signing_key.verifying_key().to_encoded_point(false);
    let jwk = serde_json::json!({
        "kty": "EC",
        "crv": "P-256",
        "kid": "test-key",
        "use": "sig",
        "alg": "ES256",
        "x": URL_SAFE_NO_PAD.encode(point.x().unwrap()),
        "y": URL_SAFE_NO_PAD.encode(point.y().unwrap()),
    });

    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "issuer": server.uri(),
            "jwks_uri": format!("{}/jwks", server.uri()),
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"keys": [jwk]})))
        .mount(server)
        .await;

    let pkcs8 = signing_key.to_pkcs8_der().unwrap();
    EncodingKey::from_ec_der(pkcs8.as_bytes())
}

fn mint(key: &EncodingKey, sub: &str, aud: &str, iss: &str) -> String {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let claims = serde_json::json!({
        "iss": iss,
        "sub": sub,
        "aud": aud,
        "exp": now + 600,
        "iat": now,
    });
    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some("test-key".to_string());
    encode(&header, &claims, key).unwrap()
}

#[tokio::test]
async fn test_missing_subject_token_answers_invalid_request() {
    let github = MockServer::start().await;
    let entra = MockServer::start().await;
    let (base, _state, shutdown, handle) = start_server(&test_config(&github, &entra)).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/token"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body("")
        .send()
        .await
        .unwrap();
    // Chat-facing path: failures still answer 200.
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_request");

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn test_unknown_subject_answers_invalid_request() {
    let github = MockServer::start().await;
    let entra = MockServer::start().await;
    let key = mount_issuer(&github).await;
    let (base, _state, shutdown, handle) = start_server(&test_config(&github, &entra)).await;

    let subject_token = mint(&key, "999999", "Iv1.test", &github.uri());
    let resp = reqwest::Client::new()
        .post(format!("{base}/token"))
        .form(&[("subject_token", subject_token.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_request");

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn test_invalid_subject_token_answers_invalid_request() {
    let github = MockServer::start().await;
    let entra = MockServer::start().await;
    let (base, _state, shutdown, handle) = start_server(&test_config(&github, &entra)).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/token"))
        .form(&[("subject_token", "not-a-jwt")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_request");

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn test_stored_token_returned_with_remaining_lifetime() {
    let github = MockServer::start().await;
    let entra = MockServer::start().await;
    let key = mount_issuer(&github).await;
    let (base, state, shutdown, handle) = start_server(&test_config(&github, &entra)).await;

    state
        .tokens
        .put(
            "583231",
            authbridge_storage::TokenRecord::new("entra-at", "Bearer", 3600, None),
        )
        .await
        .unwrap();

    let subject_token = mint(&key, "583231", "Iv1.test", &github.uri());
    let resp = reqwest::Client::new()
        .post(format!("{base}/token"))
        .form(&[("subject_token", subject_token.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["access_token"], "entra-at");
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(
        body["issued_token_type"],
        "urn:ietf:params:oauth:token-type:access_token"
    );
    let expires_in = body["expires_in"].as_u64().unwrap();
    assert!(expires_in > 3500 && expires_in <= 3600);

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn test_expired_stored_token_prompts_reauthorization() {
    let github = MockServer::start().await;
    let entra = MockServer::start().await;
    let key = mount_issuer(&github).await;
    let (base, state, shutdown, handle) = start_server(&test_config(&github, &entra)).await;

    let mut record = authbridge_storage::TokenRecord::new("entra-at", "Bearer", 60, None);
    record.issued_at -= 61;
    state.tokens.put("583231", record).await.unwrap();

    let subject_token = mint(&key, "583231", "Iv1.test", &github.uri());
    let resp = reqwest::Client::new()
        .post(format!("{base}/token"))
        .form(&[("subject_token", subject_token.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_request");

    let _ = shutdown.send(());
    let _ = handle.await;
}
