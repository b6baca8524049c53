use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_DATABASE_URL: &str = "sqlite://storefront.db?mode=rwc";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENVIRONMENT: &str = "development";
const DEFAULT_CHECKOUT_TIMEOUT_SECS: u64 = 10;

/// Placeholder secrets for local development. `validate_additional_constraints`
/// refuses to start a production process that still carries them.
const DEV_JWT_SECRET: &str =
    "dev-only-jwt-secret-change-me-0123456789abcdef0123456789abcdef";
const DEV_GATEWAY_KEY_ID: &str = "rzp_test_placeholder";
const DEV_GATEWAY_KEY_SECRET: &str = "dev-gateway-key-secret";
const DEV_WEBHOOK_SECRET: &str = "dev-webhook-secret";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// `development` or `production`. Gates CORS and secret checks.
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub log_json: bool,

    /// Run pending migrations on startup.
    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    /// Comma-separated list of allowed origins. Unset means permissive
    /// CORS in development and a refusal to start in production.
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[validate(length(min = 32), custom = "validate_secret_strength")]
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Orders at or above this subtotal ship free.
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: Decimal,

    /// Flat fee charged below the free-shipping threshold.
    #[serde(default = "default_shipping_fee")]
    pub shipping_fee: Decimal,

    /// Budget for the checkout transaction before it is abandoned.
    #[serde(default = "default_checkout_timeout_secs")]
    pub checkout_timeout_secs: u64,

    #[serde(default = "default_gateway_key_id")]
    pub razorpay_key_id: String,

    #[serde(default = "default_gateway_key_secret")]
    pub razorpay_key_secret: String,

    #[serde(default = "default_webhook_secret")]
    pub razorpay_webhook_secret: String,

    #[serde(default = "default_gateway_base_url")]
    pub razorpay_base_url: String,

    /// Generate an automatic first reply on new support tickets.
    #[serde(default = "default_true")]
    pub support_autoreply: bool,

    /// Completion endpoint for ticket auto-replies. Unset falls back to
    /// the canned keyword responder.
    #[serde(default)]
    pub reply_api_url: Option<String>,

    #[serde(default)]
    pub reply_api_key: Option<String>,
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_jwt_secret() -> String {
    DEV_JWT_SECRET.to_string()
}

fn default_free_shipping_threshold() -> Decimal {
    dec!(999)
}

fn default_shipping_fee() -> Decimal {
    dec!(49)
}

fn default_checkout_timeout_secs() -> u64 {
    DEFAULT_CHECKOUT_TIMEOUT_SECS
}

fn default_gateway_key_id() -> String {
    DEV_GATEWAY_KEY_ID.to_string()
}

fn default_gateway_key_secret() -> String {
    DEV_GATEWAY_KEY_SECRET.to_string()
}

fn default_webhook_secret() -> String {
    DEV_WEBHOOK_SECRET.to_string()
}

fn default_gateway_base_url() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn validate_secret_strength(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();
    if trimmed.len() < 32 {
        return Err(ValidationError::new("jwt_secret_too_short"));
    }
    if trimmed.chars().all(|c| c == trimmed.chars().next().unwrap_or(' ')) {
        return Err(ValidationError::new("jwt_secret_degenerate"));
    }
    Ok(())
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        !self.is_production()
    }

    /// Permissive CORS is acceptable only outside production.
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() && self.cors_allowed_origins.is_none()
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn checkout_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.checkout_timeout_secs)
    }

    /// Constraints that span fields, which `validator` derive cannot express.
    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.is_production() {
            if self.jwt_secret == DEV_JWT_SECRET {
                errors.add("jwt_secret", ValidationError::new("default_secret_in_production"));
            }
            if self.razorpay_key_secret == DEV_GATEWAY_KEY_SECRET {
                errors.add(
                    "razorpay_key_secret",
                    ValidationError::new("default_secret_in_production"),
                );
            }
            if self.razorpay_webhook_secret == DEV_WEBHOOK_SECRET {
                errors.add(
                    "razorpay_webhook_secret",
                    ValidationError::new("default_secret_in_production"),
                );
            }
        }

        if self.free_shipping_threshold < Decimal::ZERO || self.shipping_fee < Decimal::ZERO {
            errors.add("shipping_fee", ValidationError::new("negative_amount"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set; otherwise the level
/// applies to this crate, with tower_http kept at debug for request traces.
pub fn init_tracing(level: &str, json: bool) {
    let directive = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| format!("storefront_api={level},tower_http=debug"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(directive)
        .with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    // A second init (tests, embedding) is harmless.
    if result.is_err() {
        tracing::debug!("tracing subscriber was already initialized");
    }
}

/// Loads configuration in increasing precedence: built-in defaults,
/// `config/default`, `config/{RUN_ENV}`, then `APP_*` environment
/// variables (`APP_DATABASE_URL`, `APP_PORT`, ...).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = std::env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string());

    let config = Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.clone())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_env}")).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;
    app_config.validate_additional_constraints()?;
    Ok(app_config)
}
