//! Product repository: the catalog read boundary and the inventory ledger.
//!
//! All stock reads and writes go through here; nothing else touches
//! `products.stock_quantity`. The decrement is a conditional UPDATE so a
//! race for the last unit fails cleanly instead of overselling.

use sqlx::{Row, SqliteConnection, SqlitePool};

use kasuwa_core::{CurrencyCode, ProductId, ProductStatus};

use super::{parse_money, parse_product_status, RepositoryError};
use crate::models::Product;

/// Repository for catalog and inventory access.
pub struct ProductRepository<'a> {
    pool: &'a SqlitePool,
    currency: CurrencyCode,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool, currency: CurrencyCode) -> Self {
        Self { pool, currency }
    }

    /// Get a product by ID, regardless of status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails, or
    /// `RepositoryError::DataCorruption` if a stored column is invalid.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT id, name, description, price, stock_quantity, status, created_at
            FROM products
            WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| map_product(&r, self.currency)).transpose()
    }

    /// Get a product by ID, only if it is active.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails, or
    /// `RepositoryError::DataCorruption` if a stored column is invalid.
    pub async fn get_active(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT id, name, description, price, stock_quantity, status, created_at
            FROM products
            WHERE id = ?1 AND status = 'active'
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| map_product(&r, self.currency)).transpose()
    }

    /// Current available stock for a product, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stock(&self, id: ProductId) -> Result<Option<i64>, RepositoryError> {
        let row = sqlx::query("SELECT stock_quantity FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(|r| r.get::<i64, _>("stock_quantity")))
    }

    /// Whether the product is active with stock on hand.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn is_purchasable(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT 1 AS purchasable FROM products WHERE id = ?1 AND status = 'active' AND stock_quantity > 0",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.is_some())
    }
}

/// Get an active product inside a transaction, so a cart add validates
/// against the same product row it writes under.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails, or
/// `RepositoryError::DataCorruption` if a stored column is invalid.
pub async fn get_active_in_tx(
    conn: &mut SqliteConnection,
    id: ProductId,
    currency: CurrencyCode,
) -> Result<Option<Product>, RepositoryError> {
    let row = sqlx::query(
        r"
        SELECT id, name, description, price, stock_quantity, status, created_at
        FROM products
        WHERE id = ?1 AND status = 'active'
        ",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|r| map_product(&r, currency)).transpose()
}

/// Conditionally decrement stock inside a checkout or confirmation
/// transaction. Returns `false` (and changes nothing) if the product is
/// missing, inactive, or would go negative - the caller decides whether
/// that aborts the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn decrement_stock(
    conn: &mut SqliteConnection,
    id: ProductId,
    quantity: u32,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE products
        SET stock_quantity = stock_quantity - ?1
        WHERE id = ?2 AND status = 'active' AND stock_quantity >= ?1
        ",
    )
    .bind(i64::from(quantity))
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Name and current stock for a product, read inside a transaction. Used to
/// report a stock conflict after a failed decrement.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn stock_summary_in_tx(
    conn: &mut SqliteConnection,
    id: ProductId,
) -> Result<Option<(String, i64)>, RepositoryError> {
    let row = sqlx::query("SELECT name, stock_quantity FROM products WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(|r| (r.get("name"), r.get("stock_quantity"))))
}

pub(crate) fn map_product(
    row: &sqlx::sqlite::SqliteRow,
    currency: CurrencyCode,
) -> Result<Product, RepositoryError> {
    let price = parse_money(&row.get::<String, _>("price"), currency)?;
    let status: ProductStatus = parse_product_status(&row.get::<String, _>("status"))?;

    Ok(Product {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        price,
        stock_quantity: row.get("stock_quantity"),
        status,
        created_at: row.get("created_at"),
    })
}
