use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_PAYMENT_GATEWAY_URL: &str = "https://api.razorpay.com";
const DEFAULT_CARRIER_BASE_URL: &str = "https://apiv2.shiprocket.in";
const DEFAULT_SIGNATURE_HEADER: &str = "x-shiprocket-signature";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL (`memory://` selects the in-process store)
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Comma-separated list of allowed CORS origins; unset means permissive
    /// outside production
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    // ========== Payment gateway ==========
    /// Base URL of the payment gateway API
    #[serde(default = "default_payment_gateway_url")]
    pub payment_gateway_url: String,

    /// Gateway key id. Checked when the payment client is built, not here.
    #[serde(default)]
    pub payment_key_id: Option<String>,

    /// Gateway key secret
    #[serde(default)]
    pub payment_key_secret: Option<String>,

    /// ISO currency code sent with every payment intent
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub payment_currency: String,

    /// Outbound payment call timeout (seconds)
    #[serde(default = "default_outbound_timeout_secs")]
    pub payment_timeout_secs: u64,

    // ========== Carrier aggregator ==========
    /// Base URL of the carrier aggregator API
    #[serde(default = "default_carrier_base_url")]
    pub carrier_base_url: String,

    /// Carrier API account email
    #[serde(default)]
    pub carrier_email: Option<String>,

    /// Carrier API account password
    #[serde(default)]
    pub carrier_password: Option<String>,

    /// Pickup location nickname registered with the carrier
    #[serde(default = "default_pickup_location")]
    pub carrier_pickup_location: String,

    /// Outbound carrier call timeout (seconds)
    #[serde(default = "default_outbound_timeout_secs")]
    pub carrier_timeout_secs: u64,

    /// Shared secret for verifying inbound carrier webhooks; unset disables verification
    #[serde(default)]
    pub carrier_webhook_secret: Option<String>,

    /// Header carrying the hex HMAC-SHA256 signature of the webhook body
    #[serde(default = "default_signature_header")]
    pub carrier_webhook_signature_header: String,

    /// Create the carrier shipment as soon as a payment is confirmed
    #[serde(default)]
    pub auto_ship_on_payment: bool,
}

impl AppConfig {
    /// Creates a new configuration with defaults for every optional key
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            payment_gateway_url: default_payment_gateway_url(),
            payment_key_id: None,
            payment_key_secret: None,
            payment_currency: default_currency(),
            payment_timeout_secs: default_outbound_timeout_secs(),
            carrier_base_url: default_carrier_base_url(),
            carrier_email: None,
            carrier_password: None,
            carrier_pickup_location: default_pickup_location(),
            carrier_timeout_secs: default_outbound_timeout_secs(),
            carrier_webhook_secret: None,
            carrier_webhook_signature_header: default_signature_header(),
            auto_ship_on_payment: false,
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// True when orders live in the in-process store instead of a database
    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory://")
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.is_production() && self.uses_memory_store() {
            let mut err = ValidationError::new("database_url_memory_in_production");
            err.message = Some(
                "The in-process order store loses every order on restart; set APP__DATABASE_URL to a real database in production.".into(),
            );
            errors.add("database_url", err);
        }

        if self.is_production()
            && self
                .carrier_webhook_secret
                .as_deref()
                .map(|s| s.trim().is_empty())
                .unwrap_or(true)
        {
            // Not fatal: the authenticator is pluggable and some carriers cannot sign.
            tracing::warn!("carrier webhook signature verification is disabled in production");
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_payment_gateway_url() -> String {
    DEFAULT_PAYMENT_GATEWAY_URL.to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_outbound_timeout_secs() -> u64 {
    15
}

fn default_carrier_base_url() -> String {
    DEFAULT_CARRIER_BASE_URL.to_string()
}

fn default_pickup_location() -> String {
    "Primary".to_string()
}

fn default_signature_header() -> String {
    DEFAULT_SIGNATURE_HEADER.to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("order_reconciler={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://orders.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite://orders.db?mode=memory".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn defaults_validate() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn memory_store_rejected_in_production() {
        let mut cfg = base_config();
        cfg.database_url = "memory://".into();
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn bad_log_level_fails_validation() {
        let mut cfg = base_config();
        cfg.log_level = "verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn currency_must_be_iso_code() {
        let mut cfg = base_config();
        cfg.payment_currency = "RUPEE".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_gateway_keys_do_not_fail_config_load() {
        let cfg = base_config();
        assert!(cfg.payment_key_id.is_none());
        assert!(cfg.validate().is_ok());
    }
}
