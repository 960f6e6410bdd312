//! Store configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `KASUWA_DATABASE_URL` - `SQLite` connection string (falls back to `DATABASE_URL`)
//! - `KASUWA_BASE_URL` - Public URL the gateway redirects back to
//! - `KASUWA_GATEWAY_PUBLIC_KEY` - Payment gateway public key
//!
//! ## Optional
//! - `KASUWA_GATEWAY_CHECKOUT_URL` - Gateway checkout endpoint (default: Marasoft)
//! - `KASUWA_GATEWAY_REQUEST_TYPE` - `test` or `live` (default: test)
//! - `KASUWA_CURRENCY` - ISO currency code (default: NGN)
//! - `KASUWA_SHIPPING_FLAT_FEE` - Flat shipping fee (default: 10)
//! - `KASUWA_FREE_SHIPPING_THRESHOLD` - Subtotal at which shipping is waived (default: 100)

use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

use kasuwa_core::CurrencyCode;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Store application configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `SQLite` database connection URL
    pub database_url: SecretString,
    /// Public base URL, used to build the gateway redirect-back URL
    pub base_url: String,
    /// Currency all catalog prices are denominated in
    pub currency: CurrencyCode,
    /// Shipping fee policy
    pub shipping: ShippingConfig,
    /// Payment gateway configuration
    pub gateway: GatewayConfig,
}

/// Shipping fee policy: a flat fee, waived above a subtotal threshold.
#[derive(Debug, Clone)]
pub struct ShippingConfig {
    /// Flat shipping fee charged below the threshold
    pub flat_fee: Decimal,
    /// Subtotal at or above which shipping is free
    pub free_threshold: Decimal,
}

/// Payment gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Checkout endpoint the browser form-posts to
    pub checkout_url: String,
    /// Merchant public key (safe to expose in the browser form)
    pub public_key: String,
    /// Gateway environment selector: `test` or `live`
    pub request_type: String,
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("KASUWA_DATABASE_URL")?;
        let base_url = get_required_env("KASUWA_BASE_URL")?;
        let currency = match get_env_or_default("KASUWA_CURRENCY", "NGN").as_str() {
            "NGN" => CurrencyCode::NGN,
            "USD" => CurrencyCode::USD,
            "EUR" => CurrencyCode::EUR,
            "GBP" => CurrencyCode::GBP,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "KASUWA_CURRENCY".to_owned(),
                    format!("unsupported currency: {other}"),
                ));
            }
        };

        Ok(Self {
            database_url,
            base_url,
            currency,
            shipping: ShippingConfig::from_env()?,
            gateway: GatewayConfig::from_env()?,
        })
    }
}

impl ShippingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            flat_fee: get_decimal_or_default("KASUWA_SHIPPING_FLAT_FEE", "10")?,
            free_threshold: get_decimal_or_default("KASUWA_FREE_SHIPPING_THRESHOLD", "100")?,
        })
    }
}

impl GatewayConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            checkout_url: get_env_or_default(
                "KASUWA_GATEWAY_CHECKOUT_URL",
                "https://checkout.marasoftpay.live/",
            ),
            public_key: get_required_env("KASUWA_GATEWAY_PUBLIC_KEY")?,
            request_type: get_env_or_default("KASUWA_GATEWAY_REQUEST_TYPE", "test"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_owned()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_owned()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Get a decimal environment variable with a default value.
fn get_decimal_or_default(key: &str, default: &str) -> Result<Decimal, ConfigError> {
    let raw = get_env_or_default(key, default);
    Decimal::from_str(&raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_owned(), e.to_string()))
}
