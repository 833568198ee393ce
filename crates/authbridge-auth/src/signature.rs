//! Detached signature verification for webhook-style requests.
//!
//! Verifies that a request body was signed by the expected external
//! authority: the key id from a request header is resolved through the
//! [`SigningKeyCache`], and the base64 signature is checked as ECDSA
//! P-256/SHA-256 over the raw payload bytes.
//!
//! The contract is fail-closed: every failure mode - empty inputs, key fetch
//! errors, undecodable material, mismatching signature - yields `false`.
//! Nothing on this path panics or propagates an error to the caller.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;

use crate::signing_keys::SigningKeyCache;

/// Verifies detached signatures against cached public keys.
#[derive(Clone)]
pub struct SignatureVerifier {
    keys: Arc<SigningKeyCache>,
}

impl SignatureVerifier {
    /// Creates a verifier over the given key cache.
    #[must_use]
    pub fn new(keys: Arc<SigningKeyCache>) -> Self {
        Self { keys }
    }

    /// Returns `true` iff `signature_b64` is a valid signature over
    /// `payload` by the key identified by `key_id`.
    ///
    /// `bearer_token` is forwarded to the key fetch on a cache miss, for
    /// rate-limit exemption.
    pub async fn verify(
        &self,
        payload: &[u8],
        key_id: &str,
        signature_b64: &str,
        bearer_token: Option<&str>,
    ) -> bool {
        if payload.is_empty() {
            tracing::error!("signature verification failed: payload is empty");
            return false;
        }
        if key_id.trim().is_empty() {
            tracing::error!("signature verification failed: key id is empty");
            return false;
        }
        if signature_b64.trim().is_empty() {
            tracing::error!("signature verification failed: signature is empty");
            return false;
        }

        let key_der = match self.keys.get_key(key_id, bearer_token).await {
            Ok(der) => der,
            Err(e) => {
                tracing::error!(key_id = %key_id, error = %e, "could not resolve verification key");
                return false;
            }
        };

        let verifying_key = match VerifyingKey::from_public_key_der(&key_der) {
            Ok(key) => key,
            Err(e) => {
                tracing::error!(key_id = %key_id, error = %e, "cached key is not a valid P-256 SPKI");
                return false;
            }
        };

        let signature_der = match BASE64.decode(signature_b64.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "signature is not valid base64");
                return false;
            }
        };

        let signature = match Signature::from_der(&signature_der) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "signature is not valid DER");
                return false;
            }
        };

        let verified = verifying_key.verify(payload, &signature).is_ok();
        if verified {
            tracing::debug!(key_id = %key_id, "signature verified");
        } else {
            tracing::error!(key_id = %key_id, "signature verification failed");
        }
        verified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing_keys::SigningKeyConfig;
    use p256::ecdsa::SigningKey;
    use p256::ecdsa::signature::Signer;
    use p256::pkcs8::EncodePublicKey;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Stands up a keys endpoint serving one freshly generated key and
    /// returns the verifier plus the matching signer.
    async fn verifier_with_key(server: &MockServer, key_id: &str, expect: u64) -> (SignatureVerifier, SigningKey) {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let spki = signing_key
            .verifying_key()
            .to_public_key_der()
            .unwrap();
        let pem_body = BASE64.encode(spki.as_bytes());

        Mock::given(method("GET"))
            .and(path("/meta/public_keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "public_keys": [{
                    "key_identifier": key_id,
                    "key": format!(
                        "-----BEGIN PUBLIC KEY-----\n{pem_body}\n-----END PUBLIC KEY-----\n"
                    ),
                }]
            })))
            .expect(expect)
            .mount(server)
            .await;

        let endpoint = Url::parse(&format!("{}/meta/public_keys", server.uri())).unwrap();
        let cache = Arc::new(SigningKeyCache::new(SigningKeyConfig::new(endpoint)));
        (SignatureVerifier::new(cache), signing_key)
    }

    fn sign(key: &SigningKey, payload: &[u8]) -> String {
        let signature: Signature = key.sign(payload);
        BASE64.encode(signature.to_der().as_bytes())
    }

    #[tokio::test]
    async fn test_valid_signature_verifies() {
        let server = MockServer::start().await;
        let (verifier, key) = verifier_with_key(&server, "key-a", 1).await;

        let payload = br#"{"action":"ping"}"#;
        let sig = sign(&key, payload);
        assert!(verifier.verify(payload, "key-a", &sig, None).await);

        // Second verification is served from the cache (expect(1) above).
        assert!(verifier.verify(payload, "key-a", &sig, None).await);
    }

    #[tokio::test]
    async fn test_mutated_payload_fails() {
        let server = MockServer::start().await;
        let (verifier, key) = verifier_with_key(&server, "key-a", 1).await;

        let payload = br#"{"action":"ping"}"#;
        let sig = sign(&key, payload);

        let mut mutated = payload.to_vec();
        mutated[0] ^= 0x01;
        assert!(!verifier.verify(&mutated, "key-a", &sig, None).await);
    }

    #[tokio::test]
    async fn test_mutated_signature_fails() {
        let server = MockServer::start().await;
        let (verifier, key) = verifier_with_key(&server, "key-a", 1).await;

        let payload = br#"{"action":"ping"}"#;
        let sig = sign(&key, payload);
        let mut sig_bytes = BASE64.decode(&sig).unwrap();
        let last = sig_bytes.len() - 1;
        sig_bytes[last] ^= 0x01;
        let mutated_sig = BASE64.encode(&sig_bytes);

        assert!(!verifier.verify(payload, "key-a", &mutated_sig, None).await);
    }

    #[tokio::test]
    async fn test_unknown_key_id_fails_closed() {
        let server = MockServer::start().await;
        let (verifier, key) = verifier_with_key(&server, "key-a", 1).await;

        let payload = br#"{}"#;
        let sig = sign(&key, payload);
        assert!(!verifier.verify(payload, "abc", &sig, None).await);
    }

    #[tokio::test]
    async fn test_empty_inputs_fail_without_fetch() {
        let server = MockServer::start().await;
        // expect(0): empty inputs must short-circuit before any network call
        let (verifier, key) = verifier_with_key(&server, "key-a", 0).await;

        let payload = br#"{}"#;
        let sig = sign(&key, payload);
        assert!(!verifier.verify(b"", "key-a", &sig, None).await);
        assert!(!verifier.verify(payload, "", &sig, None).await);
        assert!(!verifier.verify(payload, "key-a", "", None).await);
    }

    #[tokio::test]
    async fn test_non_base64_signature_fails() {
        let server = MockServer::start().await;
        let (verifier, _key) = verifier_with_key(&server, "key-a", 1).await;

        assert!(!verifier.verify(b"{}", "key-a", "%%%", None).await);
    }
}
