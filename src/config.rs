use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Payment gateway configuration. The webhook shared secret is the
/// gateway secret key, which is also what signs inbound notifications.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct PaymentConfig {
    /// Secret key used for API authentication and webhook signatures
    #[validate(length(min = 1))]
    pub secret_key: String,

    /// Gateway API base URL
    #[serde(default = "default_payment_base_url")]
    pub base_url: String,

    /// URL the gateway redirects the shopper to after payment
    pub callback_url: String,

    /// ISO currency code used for checkout charges
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Timeout for outbound gateway calls, in seconds
    #[serde(default = "default_payment_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_payment_base_url() -> String {
    "https://api.paystack.co".to_string()
}

fn default_currency() -> String {
    "NGN".to_string()
}

fn default_payment_timeout_secs() -> u64 {
    15
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT signing secret
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// JWT expiration time in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: u64,

    /// JWT issuer claim
    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,

    /// JWT audience claim
    #[serde(default = "default_jwt_audience")]
    pub jwt_audience: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Payment gateway settings
    pub payment: PaymentConfig,
}

fn default_jwt_expiration() -> u64 {
    3600
}

fn default_jwt_issuer() -> String {
    "storefront-auth".to_string()
}

fn default_jwt_audience() -> String {
    "storefront-api".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl AppConfig {
    /// Programmatic constructor, used by the test harness.
    pub fn new(
        database_url: String,
        jwt_secret: String,
        jwt_expiration: u64,
        host: String,
        port: u16,
        environment: String,
        payment: PaymentConfig,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            jwt_issuer: default_jwt_issuer(),
            jwt_audience: default_jwt_audience(),
            host,
            port,
            environment,
            log_level: default_log_level(),
            auto_migrate: false,
            cors_allowed_origins: None,
            payment,
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }
}

/// Load configuration from `config/{default,<env>}.toml` plus `APP__`-prefixed
/// environment variables (e.g. `APP__PAYMENT__SECRET_KEY`).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = std::env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();

    let default_path = Path::new(CONFIG_DIR).join("default.toml");
    builder = builder.add_source(File::from(default_path).required(false));

    let env_path = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
    builder = builder.add_source(File::from(env_path).required(false));

    builder = builder.add_source(Environment::with_prefix("APP").separator("__"));

    let cfg: AppConfig = builder.build()?.try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    Ok(cfg)
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment_config() -> PaymentConfig {
        PaymentConfig {
            secret_key: "sk_test_secret".to_string(),
            base_url: default_payment_base_url(),
            callback_url: "https://shop.example.com/payment/callback".to_string(),
            currency: default_currency(),
            request_timeout_secs: default_payment_timeout_secs(),
        }
    }

    #[test]
    fn programmatic_config_defaults() {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "a_sufficiently_long_test_jwt_secret_value".to_string(),
            3600,
            "127.0.0.1".to_string(),
            18080,
            "test".to_string(),
            payment_config(),
        );

        assert!(cfg.is_development());
        assert_eq!(cfg.jwt_audience, "storefront-api");
        assert_eq!(cfg.payment.currency, "NGN");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "short".to_string(),
            3600,
            "127.0.0.1".to_string(),
            18080,
            "test".to_string(),
            payment_config(),
        );

        assert!(cfg.validate().is_err());
    }
}
