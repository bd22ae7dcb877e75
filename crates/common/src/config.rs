//! Application configuration.

use serde::Deserialize;
use std::path::Path;

use crate::region::DeploymentRegion;

/// Secret shipped in `config/default.toml` for local development.
pub const PLACEHOLDER_SECRET: &str = "change-me";

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Region selection.
    #[serde(default)]
    pub deployment: DeploymentConfig,
    /// Backend store credentials per region.
    #[serde(default)]
    pub backends: BackendsConfig,
    /// IP geolocation providers.
    #[serde(default)]
    pub geolocation: GeolocationConfig,
    /// Verification code policy.
    pub verification: VerificationConfig,
    /// Session revocation policy.
    #[serde(default)]
    pub sessions: SessionConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Deployment-level region selection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentConfig {
    /// Explicit region. Takes precedence over every other signal.
    #[serde(default)]
    pub region: Option<DeploymentRegion>,
    /// Host suffixes that indicate the China region.
    #[serde(default)]
    pub cn_hosts: Vec<String>,
    /// Host suffixes that indicate the global region.
    #[serde(default)]
    pub global_hosts: Vec<String>,
    /// Reject requests whose region cannot be determined instead of
    /// defaulting to the global region.
    #[serde(default)]
    pub fail_closed: bool,
}

/// Backend store configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendsConfig {
    /// Use in-process stores for both regions (development and tests).
    #[serde(default)]
    pub in_memory: bool,
    /// Global-region store (`PostgreSQL` document tables).
    #[serde(default)]
    pub global: Option<GlobalBackendConfig>,
    /// China-region store (document database HTTP API).
    #[serde(default)]
    pub cn: Option<CnBackendConfig>,
}

/// Global-region store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalBackendConfig {
    /// `PostgreSQL` connection URL.
    pub database_url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Base URL of the authentication service (for session revocation).
    #[serde(default)]
    pub auth_url: Option<String>,
    /// Service key sent alongside auth requests.
    #[serde(default)]
    pub service_key: Option<String>,
}

/// China-region store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CnBackendConfig {
    /// Base URL of the document API.
    pub endpoint: String,
    /// Environment identifier.
    pub env_id: String,
    /// API key.
    pub api_key: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

/// IP geolocation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GeolocationConfig {
    /// Providers raced against each other.
    #[serde(default = "default_geo_providers")]
    pub providers: Vec<GeoProviderConfig>,
    /// Per-provider timeout in milliseconds.
    #[serde(default = "default_geo_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            providers: default_geo_providers(),
            timeout_ms: default_geo_timeout_ms(),
        }
    }
}

/// A single geolocation provider.
#[derive(Debug, Clone, Deserialize)]
pub struct GeoProviderConfig {
    /// Provider name for logs.
    pub name: String,
    /// URL template; `{ip}` is replaced with the address being looked up.
    pub url: String,
    /// JSON field holding the ISO country code.
    pub country_field: String,
    /// JSON field holding the city name.
    #[serde(default)]
    pub city_field: Option<String>,
}

/// Verification code policy.
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    /// HMAC key used to hash stored codes.
    pub secret: String,
    /// Code lifetime in seconds.
    #[serde(default = "default_code_ttl_secs")]
    pub ttl_secs: i64,
    /// Minimum interval between two code requests for the same email and type.
    #[serde(default = "default_resend_interval_secs")]
    pub resend_interval_secs: i64,
    /// Verification attempts allowed per code.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
}

/// Session revocation policy.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Revocation attempts before giving up.
    #[serde(default = "default_revoke_attempts")]
    pub revoke_attempts: u32,
    /// Delay between revocation attempts, doubled after each failure.
    #[serde(default = "default_revoke_backoff_ms")]
    pub revoke_backoff_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            revoke_attempts: default_revoke_attempts(),
            revoke_backoff_ms: default_revoke_backoff_ms(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

const fn default_request_timeout_secs() -> u64 {
    10
}

const fn default_geo_timeout_ms() -> u64 {
    2000
}

fn default_geo_providers() -> Vec<GeoProviderConfig> {
    vec![
        GeoProviderConfig {
            name: "ipapi".to_string(),
            url: "https://ipapi.co/{ip}/json/".to_string(),
            country_field: "country_code".to_string(),
            city_field: Some("city".to_string()),
        },
        GeoProviderConfig {
            name: "ip-api".to_string(),
            url: "http://ip-api.com/json/{ip}".to_string(),
            country_field: "countryCode".to_string(),
            city_field: Some("city".to_string()),
        },
        GeoProviderConfig {
            name: "ipinfo".to_string(),
            url: "https://ipinfo.io/{ip}/json".to_string(),
            country_field: "country".to_string(),
            city_field: Some("city".to_string()),
        },
    ]
}

const fn default_code_ttl_secs() -> i64 {
    600
}

const fn default_resend_interval_secs() -> i64 {
    60
}

const fn default_max_attempts() -> i64 {
    5
}

const fn default_revoke_attempts() -> u32 {
    3
}

const fn default_revoke_backoff_ms() -> u64 {
    200
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `TWINCHAT_ENV`)
    /// 3. Environment variables with `TWINCHAT_` prefix (a `.env` file is
    ///    read into the environment first, if present)
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("TWINCHAT_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("TWINCHAT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("TWINCHAT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that must not reach a real deployment. The
    /// development placeholder secret is only allowed with in-memory
    /// backends.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let secret = self.verification.secret.trim();
        if secret.is_empty() {
            return Err(config::ConfigError::Message(
                "verification.secret must be set".to_string(),
            ));
        }
        if !self.backends.in_memory && secret == PLACEHOLDER_SECRET {
            return Err(config::ConfigError::Message(
                "verification.secret still has the development placeholder; set TWINCHAT__VERIFICATION__SECRET".to_string(),
            ));
        }
        Ok(())
    }

    /// Configuration for tests and local development: in-memory backends,
    /// no explicit region, default policies.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            deployment: DeploymentConfig::default(),
            backends: BackendsConfig {
                in_memory: true,
                global: None,
                cn: None,
            },
            geolocation: GeolocationConfig {
                providers: Vec::new(),
                timeout_ms: default_geo_timeout_ms(),
            },
            verification: VerificationConfig {
                secret: "test-secret".to_string(),
                ttl_secs: default_code_ttl_secs(),
                resend_interval_secs: default_resend_interval_secs(),
                max_attempts: default_max_attempts(),
            },
            sessions: SessionConfig {
                revoke_attempts: 1,
                revoke_backoff_ms: 0,
            },
        }
    }
}
