//! Integration test harness for Kasuwa.
//!
//! Each test gets its own in-memory `SQLite` database with the full schema
//! applied, wrapped in a [`Store`]. The pool is capped at one connection so
//! every handle sees the same in-memory database.
//!
//! Run with: `cargo test -p kasuwa-integration-tests`

use std::sync::Once;

use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::SecretString;
use sqlx::sqlite::SqlitePoolOptions;

use kasuwa_core::{CurrencyCode, ProductId, UserId};
use kasuwa_store::config::{GatewayConfig, ShippingConfig, StoreConfig};
use kasuwa_store::db;
use kasuwa_store::Store;

static TRACING: Once = Once::new();

/// Configuration used by every test store: NGN prices, a 10.00 flat
/// shipping fee waived at 100.00, and a test-mode gateway.
#[must_use]
pub fn test_config() -> StoreConfig {
    StoreConfig {
        database_url: SecretString::from("sqlite::memory:"),
        base_url: "https://shop.test".to_owned(),
        currency: CurrencyCode::NGN,
        shipping: ShippingConfig {
            flat_fee: Decimal::new(10, 0),
            free_threshold: Decimal::new(100, 0),
        },
        gateway: GatewayConfig {
            checkout_url: "https://checkout.marasoftpay.live".to_owned(),
            public_key: "MSFT_test_key".to_owned(),
            request_type: "test".to_owned(),
        },
    }
}

/// Build a store over a fresh in-memory database with migrations applied.
///
/// # Panics
///
/// Panics if the database cannot be created or migrated.
pub async fn test_store() -> Store {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    Store::new(test_config(), pool)
}

/// Seed a user and return their ID.
///
/// # Panics
///
/// Panics if the insert fails.
pub async fn seed_user(store: &Store, email: &str) -> UserId {
    let result = sqlx::query("INSERT INTO users (full_name, email, created_at) VALUES (?1, ?2, ?3)")
        .bind("Test User")
        .bind(email)
        .bind(Utc::now())
        .execute(store.pool())
        .await
        .expect("Failed to seed user");

    UserId::new(result.last_insert_rowid())
}

/// Seed an active product and return its ID.
///
/// # Panics
///
/// Panics if the insert fails.
pub async fn seed_product(store: &Store, name: &str, price: Decimal, stock: i64) -> ProductId {
    seed_product_with_status(store, name, price, stock, "active").await
}

/// Seed a product with an explicit status.
///
/// # Panics
///
/// Panics if the insert fails.
pub async fn seed_product_with_status(
    store: &Store,
    name: &str,
    price: Decimal,
    stock: i64,
    status: &str,
) -> ProductId {
    let result = sqlx::query(
        r"
        INSERT INTO products (name, description, price, stock_quantity, status, created_at)
        VALUES (?1, '', ?2, ?3, ?4, ?5)
        ",
    )
    .bind(name)
    .bind(price.to_string())
    .bind(stock)
    .bind(status)
    .bind(Utc::now())
    .execute(store.pool())
    .await
    .expect("Failed to seed product");

    ProductId::new(result.last_insert_rowid())
}

/// Current stock on hand for a product.
///
/// # Panics
///
/// Panics if the product does not exist.
pub async fn stock_on_hand(store: &Store, product_id: ProductId) -> i64 {
    store
        .products()
        .stock(product_id)
        .await
        .expect("Failed to read stock")
        .expect("Product not found")
}

/// Well-formed shipping input for checkout tests.
#[must_use]
pub fn test_shipping() -> kasuwa_store::models::ShippingDetails {
    kasuwa_store::models::ShippingDetails {
        name: "Ada Obi".to_owned(),
        email: "ada@example.com".to_owned(),
        phone: "+2348012345678".to_owned(),
        address: "14 Broad Street".to_owned(),
        city: "Lagos".to_owned(),
        state: "Lagos".to_owned(),
        order_notes: None,
    }
}
