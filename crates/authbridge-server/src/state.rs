use std::sync::Arc;

use anyhow::Context;
use url::Url;

use authbridge_auth::discovery::{DiscoveryCache, DiscoveryConfig};
use authbridge_auth::signing_keys::SigningKeyConfig;
use authbridge_auth::{
    GitHubUserClient, IdTokenValidator, JwksCache, OAuthClient, ProviderEndpoints,
    SignatureVerifier, SigningKeyCache,
};
use authbridge_storage::TokenStore;

use crate::config::AppConfig;

/// Shared application state: provider endpoints, verification components,
/// and the token store. Everything in here is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub github: Arc<ProviderEndpoints>,
    pub entra: Arc<ProviderEndpoints>,
    pub oauth: OAuthClient,
    pub github_users: GitHubUserClient,
    pub id_tokens: Arc<IdTokenValidator>,
    pub signatures: Arc<SignatureVerifier>,
    pub tokens: TokenStore,
    pub secure_cookies: bool,
}

impl AppState {
    /// Wires up all components from the loaded configuration.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let timeout = cfg.server.request_timeout();
        let base_url = cfg.base_url();
        let base_url = base_url.trim_end_matches('/');

        let github = ProviderEndpoints {
            authorize_endpoint: Url::parse(&cfg.github.authorize_endpoint)
                .context("invalid github.authorize_endpoint")?,
            token_endpoint: Url::parse(&cfg.github.token_endpoint)
                .context("invalid github.token_endpoint")?,
            client_id: cfg.github.client_id.clone(),
            client_secret: cfg.github.client_secret.clone(),
            redirect_uri: Url::parse(&format!("{base_url}{}", cfg.github.callback_path))
                .context("invalid github redirect URI")?,
            scope: cfg.github.scope.clone(),
            extra_auth_params: Vec::new(),
        };

        let entra = ProviderEndpoints {
            authorize_endpoint: Url::parse(&cfg.entra.authorize_endpoint())
                .context("invalid entra authorize endpoint")?,
            token_endpoint: Url::parse(&cfg.entra.token_endpoint())
                .context("invalid entra token endpoint")?,
            client_id: cfg.entra.client_id.clone(),
            client_secret: cfg.entra.client_secret.clone(),
            redirect_uri: Url::parse(&format!("{base_url}{}", cfg.entra.callback_path))
                .context("invalid entra redirect URI")?,
            scope: Some(cfg.entra.scope.clone()),
            extra_auth_params: vec![("response_mode".to_string(), "query".to_string())],
        };

        let discovery_config = DiscoveryConfig::default()
            .with_request_timeout(timeout)
            .with_allow_http(cfg.server.allow_insecure_issuers);
        let jwks = Arc::new(JwksCache::new(
            Arc::new(DiscoveryCache::new(discovery_config)),
            timeout,
        ));
        let id_tokens = Arc::new(IdTokenValidator::new(
            jwks,
            cfg.github.client_id.clone(),
            Url::parse(&cfg.github.issuer).context("invalid github.issuer")?,
        ));

        let signing_keys = SigningKeyCache::new(
            SigningKeyConfig::new(
                Url::parse(&cfg.github.keys_endpoint).context("invalid github.keys_endpoint")?,
            )
            .with_request_timeout(timeout)
            .with_user_agent(cfg.github.user_agent.clone()),
        );
        let signatures = Arc::new(SignatureVerifier::new(Arc::new(signing_keys)));

        let tokens = if cfg.redis.enabled {
            let pool = deadpool_redis::Config::from_url(&cfg.redis.url)
                .create_pool(Some(deadpool_redis::Runtime::Tokio1))
                .context("failed to create Redis pool")?;
            TokenStore::new_redis(pool)
        } else {
            TokenStore::new_memory()
        };

        Ok(Self {
            github: Arc::new(github),
            entra: Arc::new(entra),
            oauth: OAuthClient::new(timeout),
            github_users: GitHubUserClient::new(
                Url::parse(&cfg.github.api_base).context("invalid github.api_base")?,
                cfg.github.user_agent.clone(),
                timeout,
            ),
            id_tokens,
            signatures,
            tokens,
            secure_cookies: cfg.server.secure_cookies,
        })
    }
}
