//! OAuth2 bridging and verification core for AuthBridge.
//!
//! This crate implements the pieces of the authentication bridge that are
//! independent of the HTTP surface:
//!
//! - [`discovery`] - OIDC discovery client with a per-issuer cache
//! - [`jwks`] - per-issuer JWKS cache for identity-token validation
//! - [`id_token`] - compact-JWT identity-token validator
//! - [`signing_keys`] - cache for GitHub-style detached public keys
//! - [`signature`] - detached ECDSA signature verifier (fail-closed)
//! - [`oauth`] - authorization URL builder and authorization-code exchange
//! - [`flow_state`] - nonce + correlation-id state for the redirect chain
//! - [`github`] - minimal authenticated-user lookup
//!
//! All caches are explicit, constructor-injected components with configurable
//! endpoints so tests can point them at fakes. Key material is fetched on
//! first use and kept for the lifetime of the process; rotated upstream keys
//! require a restart to be picked up.

pub mod discovery;
pub mod error;
pub mod flow_state;
pub mod github;
pub mod id_token;
pub mod jwks;
pub mod oauth;
pub mod signature;
pub mod signing_keys;

pub use discovery::{DiscoveryCache, DiscoveryConfig, DiscoveryError};
pub use error::FlowError;
pub use flow_state::FlowState;
pub use github::GitHubUserClient;
pub use id_token::{IdTokenValidator, ValidatedClaims};
pub use jwks::{JwksCache, JwksError};
pub use oauth::{OAuthClient, ProviderEndpoints, TokenResponse};
pub use signature::SignatureVerifier;
pub use signing_keys::{SigningKeyCache, SigningKeyConfig, SigningKeyError};
