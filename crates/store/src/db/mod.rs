//! Database operations for the store's `SQLite` database.
//!
//! ## Tables
//!
//! - `users` - Registered shoppers (owned by the auth layer, read here)
//! - `products` - Catalog rows; `stock_quantity` is the inventory ledger
//! - `cart_lines` - One row per (user, product) pairing
//! - `orders` / `order_items` - Materialized checkouts
//! - `pending_payments` - Durable gateway handoffs, keyed by `merchant_ref`
//!
//! # Migrations
//!
//! Embedded from `crates/store/migrations/` and applied with
//! [`run_migrations`].
//!
//! All cross-entity consistency comes from `SQLite` transactions; the one
//! cross-user contention point (stock decrement) is a conditional UPDATE
//! that refuses to drive stock negative.

use std::str::FromStr;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use kasuwa_core::{CurrencyCode, Money, OrderStatus, PaymentMethod, ProductStatus};

pub mod cart;
pub mod orders;
pub mod products;

pub use cart::CartRepository;
pub use orders::OrderRepository;
pub use products::ProductRepository;

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored value failed to parse back into its domain type.
    #[error("data corruption: {0}")]
    DataCorruption(String),
    /// The targeted row does not exist.
    #[error("not found")]
    NotFound,
    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Create a `SQLite` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url.expose_secret())?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

/// Apply embedded migrations.
///
/// # Errors
///
/// Returns `sqlx::migrate::MigrateError` if a migration fails.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

// =============================================================================
// Column parsing helpers
// =============================================================================
//
// Prices, statuses and payment methods are stored as TEXT; a stored value
// that no longer parses is data corruption, not user error.

pub(crate) fn parse_money(raw: &str, currency: CurrencyCode) -> Result<Money, RepositoryError> {
    let amount = rust_decimal::Decimal::from_str(raw).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid money amount {raw:?}: {e}"))
    })?;
    Ok(Money::new(amount, currency))
}

pub(crate) fn parse_product_status(raw: &str) -> Result<ProductStatus, RepositoryError> {
    ProductStatus::from_str(raw).map_err(RepositoryError::DataCorruption)
}

pub(crate) fn parse_order_status(raw: &str) -> Result<OrderStatus, RepositoryError> {
    OrderStatus::from_str(raw).map_err(RepositoryError::DataCorruption)
}

pub(crate) fn parse_payment_method(raw: &str) -> Result<PaymentMethod, RepositoryError> {
    PaymentMethod::from_str(raw).map_err(RepositoryError::DataCorruption)
}

pub(crate) fn parse_quantity(raw: i64) -> Result<u32, RepositoryError> {
    u32::try_from(raw)
        .map_err(|_| RepositoryError::DataCorruption(format!("invalid quantity: {raw}")))
}
