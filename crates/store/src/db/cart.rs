//! Cart line repository.
//!
//! Cart rows are single-owner; last-committed-wins is acceptable for
//! concurrent mutations to the same user's cart. Snapshot reads join the
//! live product row for display, but checkout never trusts that snapshot -
//! it re-reads inside its own transaction via [`lines_for_checkout`].

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use kasuwa_core::{CartLineId, CurrencyCode, Money, ProductId, ProductStatus, UserId};

use super::{parse_money, parse_product_status, parse_quantity, RepositoryError};
use crate::models::CartLine;

/// Repository for cart line operations.
pub struct CartRepository<'a> {
    pool: &'a SqlitePool,
    currency: CurrencyCode,
}

/// A cart line re-read fresh inside the checkout transaction, joined with
/// the product columns checkout validation needs.
#[derive(Debug, Clone)]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub product_status: ProductStatus,
    pub unit_price: Money,
    pub available_stock: i64,
    pub quantity: u32,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool, currency: CurrencyCode) -> Self {
        Self { pool, currency }
    }

    /// All of a user's cart lines, most recently added first, denormalized
    /// with current product name/price/stock. Lines whose product went
    /// inactive are kept, with `available_stock` reported as 0, so the
    /// owner can see and remove them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails, or
    /// `RepositoryError::DataCorruption` if a stored column is invalid.
    pub async fn snapshot(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query(
            r"
            SELECT c.id, c.user_id, c.product_id, c.quantity, c.added_at,
                   p.name, p.status, p.price, p.stock_quantity
            FROM cart_lines c
            JOIN products p ON c.product_id = p.id
            WHERE c.user_id = ?1
            ORDER BY c.added_at DESC, c.id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in &rows {
            lines.push(map_cart_line(row, self.currency)?);
        }
        Ok(lines)
    }

    /// A single cart line by ID, scoped to its owner.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails, or
    /// `RepositoryError::DataCorruption` if a stored column is invalid.
    pub async fn get(
        &self,
        user_id: UserId,
        line_id: CartLineId,
    ) -> Result<Option<CartLine>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT c.id, c.user_id, c.product_id, c.quantity, c.added_at,
                   p.name, p.status, p.price, p.stock_quantity
            FROM cart_lines c
            JOIN products p ON c.product_id = p.id
            WHERE c.id = ?1 AND c.user_id = ?2
            ",
        )
        .bind(line_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        row.as_ref()
            .map(|r| map_cart_line(r, self.currency))
            .transpose()
    }

    /// Set a line's quantity. Refreshes `added_at`, which also moves the
    /// line to the top of the snapshot ordering.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line does not exist or
    /// is not owned by the user.
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        line_id: CartLineId,
        quantity: u32,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE cart_lines
            SET quantity = ?1, added_at = ?2
            WHERE id = ?3 AND user_id = ?4
            ",
        )
        .bind(i64::from(quantity))
        .bind(Utc::now())
        .bind(line_id)
        .bind(user_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// Delete a line. Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(
        &self,
        user_id: UserId,
        line_id: CartLineId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE id = ?1 AND user_id = ?2")
            .bind(line_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove every line for a user. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear(&self, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM cart_lines WHERE user_id = ?1")
            .bind(user_id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Total number of units across the user's cart (the cart badge count).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self, user_id: UserId) -> Result<u32, RepositoryError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(quantity), 0) AS total FROM cart_lines WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        parse_quantity(row.get("total"))
    }
}

/// Re-read a user's cart lines fresh inside the checkout transaction,
/// joined with the live product row. Includes lines whose product went
/// inactive, so checkout can report them as violations.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails, or
/// `RepositoryError::DataCorruption` if a stored column is invalid.
pub async fn lines_for_checkout(
    conn: &mut SqliteConnection,
    user_id: UserId,
    currency: CurrencyCode,
) -> Result<Vec<CheckoutLine>, RepositoryError> {
    let rows = sqlx::query(
        r"
        SELECT c.product_id, c.quantity,
               p.name, p.status, p.price, p.stock_quantity
        FROM cart_lines c
        JOIN products p ON c.product_id = p.id
        WHERE c.user_id = ?1
        ORDER BY c.added_at DESC, c.id DESC
        ",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut lines = Vec::with_capacity(rows.len());
    for row in rows {
        lines.push(CheckoutLine {
            product_id: row.get("product_id"),
            product_name: row.get("name"),
            product_status: parse_product_status(&row.get::<String, _>("status"))?,
            unit_price: parse_money(&row.get::<String, _>("price"), currency)?,
            available_stock: row.get("stock_quantity"),
            quantity: parse_quantity(row.get("quantity"))?,
        });
    }
    Ok(lines)
}

/// Clear a user's cart inside a transaction (checkout commit path).
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn clear_in_tx(
    conn: &mut SqliteConnection,
    user_id: UserId,
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM cart_lines WHERE user_id = ?1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// The existing line for (user, product), if any. Runs inside the add
/// transaction so the merge decision and the write see the same row.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails, or
/// `RepositoryError::DataCorruption` if the stored quantity is invalid.
pub async fn find_by_product_in_tx(
    conn: &mut SqliteConnection,
    user_id: UserId,
    product_id: ProductId,
) -> Result<Option<(CartLineId, u32)>, RepositoryError> {
    let row =
        sqlx::query("SELECT id, quantity FROM cart_lines WHERE user_id = ?1 AND product_id = ?2")
            .bind(user_id)
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;

    row.map(|r| Ok((r.get("id"), parse_quantity(r.get("quantity"))?)))
        .transpose()
}

/// Insert a new cart line inside the add transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if a line for this (user, product)
/// already exists, or `RepositoryError::Database` otherwise.
pub async fn insert_in_tx(
    conn: &mut SqliteConnection,
    user_id: UserId,
    product_id: ProductId,
    quantity: u32,
) -> Result<CartLineId, RepositoryError> {
    let result = sqlx::query(
        r"
        INSERT INTO cart_lines (user_id, product_id, quantity, added_at)
        VALUES (?1, ?2, ?3, ?4)
        ",
    )
    .bind(user_id)
    .bind(product_id)
    .bind(i64::from(quantity))
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return RepositoryError::Conflict("cart line already exists".to_owned());
        }
        RepositoryError::Database(e)
    })?;

    Ok(CartLineId::new(result.last_insert_rowid()))
}

/// Set a line's quantity inside the add transaction. Refreshes `added_at`,
/// which also moves the line to the top of the snapshot ordering.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the line does not exist or is
/// not owned by the user.
pub async fn update_quantity_in_tx(
    conn: &mut SqliteConnection,
    user_id: UserId,
    line_id: CartLineId,
    quantity: u32,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE cart_lines
        SET quantity = ?1, added_at = ?2
        WHERE id = ?3 AND user_id = ?4
        ",
    )
    .bind(i64::from(quantity))
    .bind(Utc::now())
    .bind(line_id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }

    Ok(())
}

/// Total number of units across the user's cart, read inside a transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn count_in_tx(
    conn: &mut SqliteConnection,
    user_id: UserId,
) -> Result<u32, RepositoryError> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(quantity), 0) AS total FROM cart_lines WHERE user_id = ?1",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    parse_quantity(row.get("total"))
}

fn map_cart_line(row: &SqliteRow, currency: CurrencyCode) -> Result<CartLine, RepositoryError> {
    let status = parse_product_status(&row.get::<String, _>("status"))?;
    Ok(CartLine {
        id: row.get("id"),
        user_id: row.get("user_id"),
        product_id: row.get("product_id"),
        quantity: parse_quantity(row.get("quantity"))?,
        added_at: row.get::<DateTime<Utc>, _>("added_at"),
        product_name: row.get("name"),
        product_status: status,
        unit_price: parse_money(&row.get::<String, _>("price"), currency)?,
        available_stock: if status == ProductStatus::Active {
            row.get("stock_quantity")
        } else {
            0
        },
    })
}
