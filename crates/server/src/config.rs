use serde::Deserialize;
use std::net::SocketAddr;
use thiserror::Error;
use time::UtcOffset;
use time::macros::format_description;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// How bearer tokens on `/api/resource` are verified.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    Introspection,
    Local,
}

/// Where the issuer's signing keys come from for local verification.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// `public_key` field of the Keycloak realm document.
    Realm,
    /// `jwks_uri` from the discovery document.
    Jwks,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OidcConfig {
    /// Issuer URL, e.g. `https://sso.example.org/realms/demo-sso-realm`.
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Must point at `/oidc/callback` of this service.
    pub redirect_uri: String,
    pub post_logout_redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApiConfig {
    /// Client whose `resource_access.<client_id>.roles` gate the resource API.
    pub client_id: String,
    #[serde(default = "default_required_role")]
    pub required_role: String,
    #[serde(default = "default_verification")]
    pub verification: VerificationMode,
    #[serde(default = "default_key_source")]
    pub key_source: KeySource,
    #[serde(default = "default_key_fetch_retries")]
    pub key_fetch_retries: u32,
    #[serde(default = "default_key_fetch_delay_secs")]
    pub key_fetch_delay_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebConfig {
    /// HMAC secret for the session and login-flow cookies.
    pub session_secret: String,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: i64,
    #[serde(default)]
    pub cookie_secure: bool,
    #[serde(default = "default_privileged_role")]
    pub privileged_role: String,
    /// Offset used to render token expiry, `+HH:MM` or `-HH:MM`.
    #[serde(default = "default_display_utc_offset")]
    pub display_utc_offset: String,
}

impl WebConfig {
    pub fn display_offset(&self) -> Result<UtcOffset, ConfigError> {
        UtcOffset::parse(
            self.display_utc_offset.trim(),
            format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
        )
        .map_err(|e| {
            ConfigError::Validation(format!(
                "web.display_utc_offset '{}' is not a valid offset: {e}",
                self.display_utc_offset
            ))
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
    pub oidc: OidcConfig,
    pub api: ApiConfig,
    pub web: WebConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.web.session_secret.len() < 32 {
            return Err(ConfigError::Validation(
                "web.session_secret must be at least 32 bytes".into(),
            ));
        }
        if self.oidc.client_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "oidc.client_id must not be empty".into(),
            ));
        }
        if self.api.client_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "api.client_id must not be empty".into(),
            ));
        }
        if self.web.session_ttl_secs <= 0 {
            return Err(ConfigError::Validation(
                "web.session_ttl_secs must be > 0".into(),
            ));
        }
        self.bind_address.parse::<SocketAddr>().map_err(|e| {
            ConfigError::Validation(format!(
                "bind_address '{}' is not a socket address: {e}",
                self.bind_address
            ))
        })?;
        url::Url::parse(&self.oidc.issuer_url).map_err(|e| {
            ConfigError::Validation(format!("oidc.issuer_url is not a valid URL: {e}"))
        })?;
        self.web.display_offset()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|e| ConfigError::Validation(format!("bind_address: {e}")))
    }
}

fn default_scopes() -> Vec<String> {
    ["openid", "email", "profile"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_required_role() -> String {
    "Student".to_string()
}

fn default_verification() -> VerificationMode {
    VerificationMode::Local
}

fn default_key_source() -> KeySource {
    KeySource::Realm
}

fn default_key_fetch_retries() -> u32 {
    5
}

fn default_key_fetch_delay_secs() -> u64 {
    5
}

fn default_session_ttl_secs() -> i64 {
    8 * 60 * 60
}

fn default_privileged_role() -> String {
    "lecturer".to_string()
}

fn default_display_utc_offset() -> String {
    "+07:00".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:5001".to_string()
}

fn default_run_migrations() -> bool {
    true
}

/// Load application configuration from `config.yaml` (or `$CONFIG_PATH`) + environment overrides.
///
/// Environment variables override file values using double underscores as the
/// key separator (e.g. `OIDC__CLIENT_SECRET`).
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    load_config_from(&path)
}

/// Same as [`load_config`] but reads the given file.
pub fn load_config_from(path: &str) -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
