use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// GitHub App (upstream provider) configuration
    #[serde(default)]
    pub github: GitHubConfig,
    /// Entra ID (downstream provider) configuration
    #[serde(default)]
    pub entra: EntraConfig,
    /// Redis token store configuration
    #[serde(default)]
    pub redis: RedisConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Provider credentials are required: without them every flow 400s.
        if self.github.client_id.is_empty() {
            return Err("github.client_id must be set".into());
        }
        if self.github.client_secret.is_empty() {
            return Err("github.client_secret must be set".into());
        }
        if self.entra.client_id.is_empty() {
            return Err("entra.client_id must be set".into());
        }
        if self.entra.client_secret.is_empty() {
            return Err("entra.client_secret must be set".into());
        }
        // Redis validation
        if self.redis.enabled && self.redis.url.is_empty() {
            return Err("redis.enabled=true requires redis.url".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    /// Returns the externally visible base URL for redirect URIs.
    /// If `base_url` is configured, returns that; otherwise computes from host:port.
    pub fn base_url(&self) -> String {
        self.server
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.server.host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally visible base URL, used to build provider redirect URIs.
    /// If not set, defaults to http://{host}:{port}
    #[serde(default)]
    pub base_url: Option<String>,
    /// Timeout for all outbound provider calls.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Whether flow-state cookies carry the Secure attribute. Disable only
    /// for plain-HTTP local development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
    /// Whether plain-HTTP issuer URLs are accepted for OIDC discovery.
    /// Disable only for local development against fake providers.
    #[serde(default)]
    pub allow_insecure_issuers: bool,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_secure_cookies() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
            request_timeout_ms: default_request_timeout_ms(),
            secure_cookies: default_secure_cookies(),
            allow_insecure_issuers: false,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// GitHub App configuration: the first hop of the chain, the identity the
/// token store is keyed by, and the issuer of `/token` subject tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_github_authorize_endpoint")]
    pub authorize_endpoint: String,
    #[serde(default = "default_github_token_endpoint")]
    pub token_endpoint: String,
    /// REST API base, for the authenticated-user lookup.
    #[serde(default = "default_github_api_base")]
    pub api_base: String,
    /// Endpoint publishing the detached webhook signing keys.
    #[serde(default = "default_github_keys_endpoint")]
    pub keys_endpoint: String,
    /// Issuer of the id tokens presented to `/token`.
    #[serde(default = "default_github_issuer")]
    pub issuer: String,
    /// Callback path registered with the GitHub App.
    #[serde(default = "default_github_callback_path")]
    pub callback_path: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Scope for the authorization request. GitHub Apps ignore it.
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_github_authorize_endpoint() -> String {
    "https://github.com/login/oauth/authorize".into()
}
fn default_github_token_endpoint() -> String {
    "https://github.com/login/oauth/access_token".into()
}
fn default_github_api_base() -> String {
    "https://api.github.com".into()
}
fn default_github_keys_endpoint() -> String {
    "https://api.github.com/meta/public_keys/copilot_api".into()
}
fn default_github_issuer() -> String {
    "https://github.com/login/oauth".into()
}
fn default_github_callback_path() -> String {
    "/postauth-github".into()
}
fn default_user_agent() -> String {
    "authbridge".into()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            authorize_endpoint: default_github_authorize_endpoint(),
            token_endpoint: default_github_token_endpoint(),
            api_base: default_github_api_base(),
            keys_endpoint: default_github_keys_endpoint(),
            issuer: default_github_issuer(),
            callback_path: default_github_callback_path(),
            user_agent: default_user_agent(),
            scope: None,
        }
    }
}

/// Entra ID configuration: the second hop of the chain.
///
/// Endpoints derive from `instance` + `tenant_id`; the explicit
/// `authorize_endpoint`/`token_endpoint` overrides exist for tests and
/// sovereign-cloud deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntraConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_entra_instance")]
    pub instance: String,
    #[serde(default = "default_entra_tenant")]
    pub tenant_id: String,
    #[serde(default)]
    pub authorize_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default = "default_entra_scope")]
    pub scope: String,
    /// Callback path registered with the Entra ID application.
    #[serde(default = "default_entra_callback_path")]
    pub callback_path: String,
}

fn default_entra_instance() -> String {
    "https://login.microsoftonline.com".into()
}
fn default_entra_tenant() -> String {
    "common".into()
}
fn default_entra_scope() -> String {
    "openid profile email offline_access".into()
}
fn default_entra_callback_path() -> String {
    "/postauth-entra".into()
}

impl Default for EntraConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            instance: default_entra_instance(),
            tenant_id: default_entra_tenant(),
            authorize_endpoint: None,
            token_endpoint: None,
            scope: default_entra_scope(),
            callback_path: default_entra_callback_path(),
        }
    }
}

impl EntraConfig {
    pub fn authorize_endpoint(&self) -> String {
        self.authorize_endpoint.clone().unwrap_or_else(|| {
            format!(
                "{}/{}/oauth2/v2.0/authorize",
                self.instance.trim_end_matches('/'),
                self.tenant_id
            )
        })
    }

    pub fn token_endpoint(&self) -> String {
        self.token_endpoint.clone().unwrap_or_else(|| {
            format!(
                "{}/{}/oauth2/v2.0/token",
                self.instance.trim_end_matches('/'),
                self.tenant_id
            )
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// When false, the token store runs in-process (single instance only).
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub url: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".into()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("authbridge.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., AUTHBRIDGE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("AUTHBRIDGE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }
}
