use serde::Deserialize;
use shared::crypto::{CredentialVault, CryptoError};
use std::net::{IpAddr, SocketAddr};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    #[serde(default)]
    pub cart: CartConfig,
    pub square: SquareConfig,
    pub encryption: EncryptionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Public origin of the site (e.g. `https://shop.example.com`).
    #[serde(default)]
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn pool_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Requests per minute per client IP on public write endpoints.
    /// Zero disables limiting.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Tracked client IPs at which idle limiter entries are pruned.
    #[serde(default = "default_rate_limit_max_tracked")]
    pub rate_limit_max_tracked_ips: usize,

    /// Reverse proxy addresses whose `X-Forwarded-For` is honored.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,

    /// Hex SHA-256 of the admin key expected in `X-Admin-Key`.
    #[serde(default)]
    pub admin_key_hash: String,

    /// RSA public key (PEM) for shopper access tokens.
    #[serde(default)]
    pub jwt_public_key: String,

    /// Shared HS256 secret, used when no public key is configured.
    #[serde(default)]
    pub jwt_secret: String,

    #[serde(default = "default_jwt_leeway")]
    pub jwt_leeway_secs: u64,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("cors_origins", &self.cors_origins)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("rate_limit_max_tracked_ips", &self.rate_limit_max_tracked_ips)
            .field("trusted_proxies", &self.trusted_proxies)
            .field("jwt_leeway_secs", &self.jwt_leeway_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartConfig {
    #[serde(default = "default_cart_ttl_hours")]
    pub ttl_hours: i64,
}

impl SecurityConfig {
    /// Parsed `trusted_proxies`.
    pub fn trusted_proxy_ips(&self) -> Result<Vec<IpAddr>, ConfigValidationError> {
        self.trusted_proxies
            .iter()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| {
                raw.trim().parse::<IpAddr>().map_err(|_| {
                    ConfigValidationError::InvalidValue(format!(
                        "security.trusted_proxies: '{}' is not an IP address",
                        raw
                    ))
                })
            })
            .collect()
    }
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_cart_ttl_hours(),
        }
    }
}

/// Square integration settings.
#[derive(Clone, Deserialize)]
pub struct SquareConfig {
    #[serde(default)]
    pub enabled: bool,

    /// `sandbox` or `production`
    #[serde(default = "default_square_environment")]
    pub environment: String,

    #[serde(default)]
    pub application_id: String,

    #[serde(default)]
    pub application_secret: String,

    #[serde(default)]
    pub redirect_url: String,

    #[serde(default = "default_square_scopes")]
    pub scopes: Vec<String>,

    /// Operator access token that bypasses OAuth when set.
    #[serde(default)]
    pub access_token: String,

    #[serde(default)]
    pub location_id: String,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default)]
    pub webhook_signature_key: String,

    /// Notification URL registered with Square. Derived from the request
    /// when empty.
    #[serde(default)]
    pub webhook_url: String,

    #[serde(default = "default_square_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_square_api_version")]
    pub api_version: String,
}

impl std::fmt::Debug for SquareConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SquareConfig")
            .field("enabled", &self.enabled)
            .field("environment", &self.environment)
            .field("application_id", &self.application_id)
            .field("redirect_url", &self.redirect_url)
            .field("scopes", &self.scopes)
            .field("location_id", &self.location_id)
            .field("currency", &self.currency)
            .field("webhook_url", &self.webhook_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl SquareConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Base URL of the Square API for the configured environment.
    pub fn base_url(&self) -> &'static str {
        if self.is_production() {
            "https://connect.squareup.com"
        } else {
            "https://connect.squareupsandbox.com"
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct EncryptionConfig {
    /// 32-byte key, hex encoded.
    #[serde(default)]
    pub key: String,
}

impl std::fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl EncryptionConfig {
    pub fn vault(&self) -> Result<CredentialVault, CryptoError> {
        CredentialVault::from_hex(&self.key)
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_rate_limit() -> u32 {
    30
}
fn default_rate_limit_max_tracked() -> usize {
    10_000
}
fn default_jwt_leeway() -> u64 {
    30
}
fn default_cart_ttl_hours() -> i64 {
    domain::services::DEFAULT_CART_TTL_HOURS
}
fn default_square_environment() -> String {
    "sandbox".to_string()
}
fn default_square_scopes() -> Vec<String> {
    [
        "MERCHANT_PROFILE_READ",
        "ITEMS_READ",
        "ORDERS_WRITE",
        "ORDERS_READ",
        "PAYMENTS_WRITE",
        "PAYMENTS_READ",
        "CUSTOMERS_WRITE",
        "CUSTOMERS_READ",
        "APPOINTMENTS_WRITE",
        "APPOINTMENTS_READ",
        "APPOINTMENTS_BUSINESS_SETTINGS_READ",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_currency() -> String {
    "USD".to_string()
}
fn default_square_timeout() -> u64 {
    15
}
fn default_square_api_version() -> String {
    "2024-10-17".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with SF__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("SF")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("security.cors_origins")
                    .with_list_parse_key("security.trusted_proxies")
                    .with_list_parse_key("square.scopes")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Builds the config from embedded defaults and overrides only, so tests
    /// do not depend on the working directory.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30
            public_url = "https://shop.example.com"

            [database]
            url = ""
            max_connections = 20
            min_connections = 5
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "json"

            [security]
            cors_origins = []
            rate_limit_per_minute = 30
            rate_limit_max_tracked_ips = 10000
            trusted_proxies = []
            admin_key_hash = ""
            jwt_public_key = ""
            jwt_secret = "test-jwt-secret"
            jwt_leeway_secs = 0

            [cart]
            ttl_hours = 168

            [square]
            enabled = true
            environment = "sandbox"
            application_id = "sandbox-app-id"
            application_secret = "sandbox-app-secret"
            redirect_url = "https://shop.example.com/api/v1/oauth/square/callback"
            access_token = ""
            location_id = "LOC-1"
            currency = "USD"
            webhook_signature_key = ""
            webhook_url = ""
            request_timeout_secs = 15
            api_version = "2024-10-17"

            [encryption]
            key = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        // Skip validation in tests to allow partial configs
        Ok(cfg)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "SF__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        self.encryption.vault().map_err(|e| {
            ConfigValidationError::InvalidValue(format!("SF__ENCRYPTION__KEY: {}", e))
        })?;

        self.security.trusted_proxy_ips()?;

        if self.cart.ttl_hours <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "cart.ttl_hours must be positive".to_string(),
            ));
        }

        if !matches!(self.square.environment.as_str(), "sandbox" | "production") {
            return Err(ConfigValidationError::InvalidValue(format!(
                "square.environment must be sandbox or production, got {}",
                self.square.environment
            )));
        }

        if self.square.enabled && self.square.currency.len() != 3 {
            return Err(ConfigValidationError::InvalidValue(
                "square.currency must be an ISO 4217 code".to_string(),
            ));
        }

        if self.square.request_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "square.request_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigValidationError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|_| {
                ConfigValidationError::InvalidValue(format!(
                    "Invalid listen address {}:{}",
                    self.server.host, self.server.port
                ))
            })
    }
}
