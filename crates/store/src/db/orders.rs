//! Order, order item and pending payment repository.
//!
//! Orders and their line items are only ever written inside the checkout
//! transaction; status changes go through the guarded
//! [`transition_status`], which enforces the monotonic state machine at
//! the storage layer.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool};

use kasuwa_core::{CurrencyCode, Email, Money, OrderId, OrderStatus, PaymentMethod, UserId};

use super::{
    parse_money, parse_order_status, parse_payment_method, parse_quantity, RepositoryError,
};
use crate::models::{Order, OrderLineItem, PendingPayment, ShippingSnapshot};

/// Fields for a new order row, written as `pending`.
#[derive(Debug)]
pub struct NewOrder<'a> {
    pub user_id: UserId,
    pub total_amount: Money,
    pub merchant_ref: &'a str,
    pub payment_method: PaymentMethod,
    pub shipping: &'a ShippingSnapshot,
    pub order_notes: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// Repository for order reads outside any transaction.
pub struct OrderRepository<'a> {
    pool: &'a SqlitePool,
    currency: CurrencyCode,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool, currency: CurrencyCode) -> Self {
        Self { pool, currency }
    }

    /// Get an order by ID, scoped to its owner.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails, or
    /// `RepositoryError::DataCorruption` if a stored column is invalid.
    pub async fn get(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, total_amount, status, merchant_ref, payment_method,
                   shipping_name, shipping_email, shipping_phone, shipping_address,
                   order_notes, created_at
            FROM orders
            WHERE id = ?1 AND user_id = ?2
            ",
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| map_order(&r, self.currency)).transpose()
    }

    /// Line items for an order, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails, or
    /// `RepositoryError::DataCorruption` if a stored column is invalid.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>, RepositoryError> {
        let rows = sqlx::query(
            r"
            SELECT id, order_id, product_id, quantity, price
            FROM order_items
            WHERE order_id = ?1
            ORDER BY id
            ",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(|r| map_item(r, self.currency)).collect()
    }
}

/// Insert the order row.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the merchant reference already
/// exists, or `RepositoryError::Database` otherwise.
pub async fn insert_order(
    conn: &mut SqliteConnection,
    new: &NewOrder<'_>,
) -> Result<OrderId, RepositoryError> {
    let result = sqlx::query(
        r"
        INSERT INTO orders (user_id, total_amount, status, merchant_ref, payment_method,
                            shipping_name, shipping_email, shipping_phone, shipping_address,
                            order_notes, created_at)
        VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ",
    )
    .bind(new.user_id)
    .bind(new.total_amount.amount.to_string())
    .bind(new.merchant_ref)
    .bind(new.payment_method.to_string())
    .bind(&new.shipping.name)
    .bind(&new.shipping.email)
    .bind(&new.shipping.phone)
    .bind(&new.shipping.address)
    .bind(new.order_notes)
    .bind(new.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return RepositoryError::Conflict("merchant_ref already exists".to_owned());
        }
        RepositoryError::Database(e)
    })?;

    Ok(OrderId::new(result.last_insert_rowid()))
}

/// Insert one line item, carrying the purchase-time price.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_item(
    conn: &mut SqliteConnection,
    order_id: OrderId,
    product_id: kasuwa_core::ProductId,
    quantity: u32,
    price: Money,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO order_items (order_id, product_id, quantity, price)
        VALUES (?1, ?2, ?3, ?4)
        ",
    )
    .bind(order_id)
    .bind(product_id)
    .bind(i64::from(quantity))
    .bind(price.amount.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Transition an order's status, guarded on the expected current status.
/// Returns `false` (and changes nothing) if the order is not currently in
/// `from` - the storage-level backstop for the monotonic state machine.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn transition_status(
    conn: &mut SqliteConnection,
    order_id: OrderId,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<bool, RepositoryError> {
    debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");

    let result = sqlx::query("UPDATE orders SET status = ?1 WHERE id = ?2 AND status = ?3")
        .bind(to.to_string())
        .bind(order_id)
        .bind(from.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Fetch an order inside a transaction, scoped to its owner.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails, or
/// `RepositoryError::DataCorruption` if a stored column is invalid.
pub async fn get_in_tx(
    conn: &mut SqliteConnection,
    user_id: UserId,
    order_id: OrderId,
    currency: CurrencyCode,
) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query(
        r"
        SELECT id, user_id, total_amount, status, merchant_ref, payment_method,
               shipping_name, shipping_email, shipping_phone, shipping_address,
               order_notes, created_at
        FROM orders
        WHERE id = ?1 AND user_id = ?2
        ",
    )
    .bind(order_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|r| map_order(&r, currency)).transpose()
}

/// Line items for an order, read inside a transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails, or
/// `RepositoryError::DataCorruption` if a stored column is invalid.
pub async fn items_in_tx(
    conn: &mut SqliteConnection,
    order_id: OrderId,
    currency: CurrencyCode,
) -> Result<Vec<OrderLineItem>, RepositoryError> {
    let rows = sqlx::query(
        r"
        SELECT id, order_id, product_id, quantity, price
        FROM order_items
        WHERE order_id = ?1
        ORDER BY id
        ",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(|r| map_item(r, currency)).collect()
}

/// Insert the durable pending payment row for a deferred-method order.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if a pending payment already exists
/// for this merchant reference or order.
pub async fn insert_pending_payment(
    conn: &mut SqliteConnection,
    pending: &PendingPayment,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO pending_payments (merchant_ref, order_id, amount_minor, customer_name,
                                      customer_email, customer_phone, payment_method, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ",
    )
    .bind(&pending.merchant_ref)
    .bind(pending.order_id)
    .bind(pending.amount_minor)
    .bind(&pending.customer_name)
    .bind(&pending.customer_email)
    .bind(&pending.customer_phone)
    .bind(pending.payment_method.to_string())
    .bind(pending.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return RepositoryError::Conflict("pending payment already exists".to_owned());
        }
        RepositoryError::Database(e)
    })?;

    Ok(())
}

/// The pending payment for an order, if one is still outstanding.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails, or
/// `RepositoryError::DataCorruption` if a stored column is invalid.
pub async fn pending_payment_for_order(
    conn: &mut SqliteConnection,
    order_id: OrderId,
) -> Result<Option<PendingPayment>, RepositoryError> {
    let row = sqlx::query(
        r"
        SELECT merchant_ref, order_id, amount_minor, customer_name,
               customer_email, customer_phone, payment_method, created_at
        FROM pending_payments
        WHERE order_id = ?1
        ",
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let customer_email = Email::parse(&row.get::<String, _>("customer_email")).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid email in pending payment: {e}"))
    })?;

    Ok(Some(PendingPayment {
        merchant_ref: row.get("merchant_ref"),
        order_id: row.get("order_id"),
        amount_minor: row.get("amount_minor"),
        customer_name: row.get("customer_name"),
        customer_email,
        customer_phone: row.get("customer_phone"),
        payment_method: parse_payment_method(&row.get::<String, _>("payment_method"))?,
        created_at: row.get("created_at"),
    }))
}

/// Consume (delete) a pending payment.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the delete fails.
pub async fn delete_pending_payment(
    conn: &mut SqliteConnection,
    merchant_ref: &str,
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM pending_payments WHERE merchant_ref = ?1")
        .bind(merchant_ref)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

fn map_order(row: &sqlx::sqlite::SqliteRow, currency: CurrencyCode) -> Result<Order, RepositoryError> {
    let email = Email::parse(&row.get::<String, _>("shipping_email")).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid email in order: {e}"))
    })?;

    Ok(Order {
        id: row.get("id"),
        user_id: row.get("user_id"),
        total_amount: parse_money(&row.get::<String, _>("total_amount"), currency)?,
        status: parse_order_status(&row.get::<String, _>("status"))?,
        merchant_ref: row.get("merchant_ref"),
        payment_method: parse_payment_method(&row.get::<String, _>("payment_method"))?,
        shipping: ShippingSnapshot {
            name: row.get("shipping_name"),
            email,
            phone: row.get("shipping_phone"),
            address: row.get("shipping_address"),
        },
        order_notes: row.get("order_notes"),
        created_at: row.get("created_at"),
    })
}

fn map_item(
    row: &sqlx::sqlite::SqliteRow,
    currency: CurrencyCode,
) -> Result<OrderLineItem, RepositoryError> {
    Ok(OrderLineItem {
        id: row.get("id"),
        order_id: row.get("order_id"),
        product_id: row.get("product_id"),
        quantity: parse_quantity(row.get("quantity"))?,
        price: parse_money(&row.get::<String, _>("price"), currency)?,
    })
}
