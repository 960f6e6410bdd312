//! Domain models for the cart-to-order pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kasuwa_core::{
    CartLineId, Email, Money, MoneyError, OrderId, OrderItemId, OrderStatus, PaymentMethod,
    ProductId, ProductStatus, UserId,
};

/// A catalog product. Stock is owned by the inventory side of the product
/// repository; everything else is read-only display data here.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock_quantity: i64,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Active status and stock on hand.
    #[must_use]
    pub fn is_purchasable(&self) -> bool {
        self.status == ProductStatus::Active && self.stock_quantity > 0
    }
}

/// One (user, product) cart line, denormalized with the product fields the
/// cart page displays. The denormalized price/stock are a point-in-time
/// view - checkout re-reads fresh state and never trusts them.
///
/// Lines whose product went inactive stay visible (with
/// `available_stock` reported as 0) so the user can see why checkout is
/// blocked and remove them.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
    pub product_name: String,
    pub product_status: ProductStatus,
    pub unit_price: Money,
    /// Units currently purchasable (0 when the product is inactive).
    pub available_stock: i64,
}

impl CartLine {
    /// Line subtotal at the displayed unit price.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Overflow` on arithmetic overflow.
    pub fn line_total(&self) -> Result<Money, MoneyError> {
        self.unit_price.times(self.quantity)
    }
}

/// Shipping contact and address snapshot stored on the order at creation
/// time. Never re-derived from the user profile afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingSnapshot {
    pub name: String,
    pub email: Email,
    pub phone: String,
    /// Street address, city and state flattened into one line.
    pub address: String,
}

/// Raw shipping form input, validated into a [`ShippingSnapshot`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub order_notes: Option<String>,
}

impl ShippingDetails {
    /// Validate the form input and flatten it into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns one message per missing or invalid field.
    pub fn validate(&self) -> Result<ShippingSnapshot, Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Full name is required.".to_owned());
        }
        let email = if self.email.trim().is_empty() {
            errors.push("Email address is required.".to_owned());
            None
        } else {
            match Email::parse(self.email.trim()) {
                Ok(email) => Some(email),
                Err(_) => {
                    errors.push("Please enter a valid email address.".to_owned());
                    None
                }
            }
        };
        if self.phone.trim().is_empty() {
            errors.push("Phone number is required.".to_owned());
        }
        if self.address.trim().is_empty() {
            errors.push("Shipping address is required.".to_owned());
        }
        if self.city.trim().is_empty() {
            errors.push("City is required.".to_owned());
        }
        if self.state.trim().is_empty() {
            errors.push("State is required.".to_owned());
        }

        match (errors.is_empty(), email) {
            (true, Some(email)) => Ok(ShippingSnapshot {
                name: self.name.trim().to_owned(),
                email,
                phone: self.phone.trim().to_owned(),
                address: format!(
                    "{}, {}, {}",
                    self.address.trim(),
                    self.city.trim(),
                    self.state.trim()
                ),
            }),
            _ => Err(errors),
        }
    }
}

/// An immutable record of an intended purchase, with a mutable fulfillment
/// status. The shipping fields are a creation-time snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub total_amount: Money,
    pub status: OrderStatus,
    /// Globally unique idempotency key shared with the payment processor.
    pub merchant_ref: String,
    pub payment_method: PaymentMethod,
    pub shipping: ShippingSnapshot,
    pub order_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A product/quantity/price snapshot taken at purchase time, owned by one
/// order. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct OrderLineItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price at time of purchase (decoupled from the live price).
    pub price: Money,
}

/// Durable record of a handoff to the payment gateway, keyed by
/// `merchant_ref`. Written in the same transaction as the order for
/// deferred payment methods; consumed on the confirmation callback.
#[derive(Debug, Clone, Serialize)]
pub struct PendingPayment {
    pub merchant_ref: String,
    pub order_id: OrderId,
    /// Total in the currency's minor unit, as the gateway expects.
    pub amount_minor: i64,
    pub customer_name: String,
    pub customer_email: Email,
    pub customer_phone: String,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
}
