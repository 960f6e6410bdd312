//! The Order Materializer: converts a live cart into a persisted order.
//!
//! The whole conversion runs inside one transaction. Validation happens
//! before any write; a failure at any step rolls everything back, so a
//! checkout either produces exactly one order with its line items or
//! nothing at all.

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::instrument;

use kasuwa_core::{Money, OrderId, OrderStatus, PaymentMethod, ProductStatus, Settlement, UserId};

use crate::config::{ShippingConfig, StoreConfig};
use crate::db::{self, cart, orders, products, RepositoryError};
use crate::error::{Result, StockViolation, StoreError};
use crate::models::{Order, PendingPayment, ShippingDetails};
use crate::services::payment::GatewayRedirect;
use crate::session::SessionContext;

/// The result of a successful checkout.
#[derive(Debug)]
pub enum CheckoutOutcome {
    /// Cash on delivery: inventory decremented, cart cleared, order already
    /// in `Processing`. Nothing left to do.
    Completed { order: Order },
    /// Card/transfer: order committed as `Pending`, inventory untouched,
    /// cart intact. The caller must send the browser to the gateway.
    AwaitingPayment {
        order: Order,
        redirect: GatewayRedirect,
    },
}

/// Order Materializer service.
pub struct CheckoutService<'a> {
    pool: &'a SqlitePool,
    config: &'a StoreConfig,
}

impl<'a> CheckoutService<'a> {
    pub(crate) const fn new(pool: &'a SqlitePool, config: &'a StoreConfig) -> Self {
        Self { pool, config }
    }

    /// Convert the caller's cart into an order.
    ///
    /// Re-validates every cart line against fresh product state, computes
    /// the total at current prices, persists the order and its line items,
    /// then settles immediately (cod) or hands off to the gateway
    /// (card/transfer) - all inside one transaction.
    ///
    /// # Errors
    ///
    /// `Unauthorized`/`Forbidden` from the session boundary, `Validation`
    /// for bad shipping input, `EmptyCart` (callers redirect to the cart
    /// page), `StockConflict` naming every offending product, or
    /// `Repository` if storage fails (nothing is persisted).
    #[instrument(skip(self, ctx, csrf, details), fields(method = %payment_method))]
    pub async fn place_order(
        &self,
        ctx: &SessionContext,
        csrf: &str,
        details: &ShippingDetails,
        payment_method: PaymentMethod,
    ) -> Result<CheckoutOutcome> {
        let identity = ctx.authorize(csrf)?;
        let shipping = details.validate().map_err(StoreError::Validation)?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        // Step 1: re-read every cart line fresh; the earlier display
        // snapshot is not trusted.
        let lines = cart::lines_for_checkout(&mut tx, identity.user_id, self.config.currency).await?;
        if lines.is_empty() {
            return Err(StoreError::EmptyCart);
        }

        let violations: Vec<StockViolation> = lines
            .iter()
            .filter(|line| {
                line.product_status != ProductStatus::Active
                    || i64::from(line.quantity) > line.available_stock
            })
            .map(|line| StockViolation {
                product_id: line.product_id,
                name: line.product_name.clone(),
                requested: line.quantity,
                available: if line.product_status == ProductStatus::Active {
                    line.available_stock
                } else {
                    0
                },
            })
            .collect();
        if !violations.is_empty() {
            return Err(StoreError::StockConflict(violations));
        }

        // Step 2: totals at current prices - these are the prices charged.
        let mut subtotal = Money::zero(self.config.currency);
        let mut total_items: u32 = 0;
        for line in &lines {
            subtotal = subtotal.checked_add(line.unit_price.times(line.quantity)?)?;
            total_items = total_items.saturating_add(line.quantity);
        }
        let shipping_cost = shipping_cost(subtotal.amount, &self.config.shipping);
        let total = subtotal.checked_add(Money::new(shipping_cost, self.config.currency))?;

        // Steps 3-4: mint the idempotency key, persist order + items.
        let merchant_ref = mint_merchant_ref(identity.user_id);
        let created_at = Utc::now();
        let order_id = orders::insert_order(
            &mut tx,
            &orders::NewOrder {
                user_id: identity.user_id,
                total_amount: total,
                merchant_ref: &merchant_ref,
                payment_method,
                shipping: &shipping,
                order_notes: details.order_notes.as_deref(),
                created_at,
            },
        )
        .await?;

        for line in &lines {
            orders::insert_item(&mut tx, order_id, line.product_id, line.quantity, line.unit_price)
                .await?;
        }

        // Step 5: settle now or defer to the gateway.
        match payment_method.settlement() {
            Settlement::Immediate => {
                for line in &lines {
                    // Same transaction as the validation above, but keep the
                    // conditional form as the inventory floor backstop.
                    if !products::decrement_stock(&mut tx, line.product_id, line.quantity).await? {
                        return Err(StoreError::StockConflict(vec![StockViolation {
                            product_id: line.product_id,
                            name: line.product_name.clone(),
                            requested: line.quantity,
                            available: line.available_stock,
                        }]));
                    }
                }
                orders::transition_status(
                    &mut tx,
                    order_id,
                    OrderStatus::Pending,
                    OrderStatus::Processing,
                )
                .await?;
                cart::clear_in_tx(&mut tx, identity.user_id).await?;
                tx.commit().await.map_err(RepositoryError::from)?;

                let order = self.fetch_order(identity.user_id, order_id).await?;
                tracing::info!(%order_id, %merchant_ref, "cod order settled");
                Ok(CheckoutOutcome::Completed { order })
            }
            Settlement::Deferred => {
                // Inventory is NOT decremented and the cart is NOT cleared;
                // both wait for the confirmation callback.
                let pending = PendingPayment {
                    merchant_ref: merchant_ref.clone(),
                    order_id,
                    amount_minor: total.to_minor_units()?,
                    customer_name: shipping.name.clone(),
                    customer_email: shipping.email.clone(),
                    customer_phone: shipping.phone.clone(),
                    payment_method,
                    created_at,
                };
                orders::insert_pending_payment(&mut tx, &pending).await?;
                tx.commit().await.map_err(RepositoryError::from)?;

                let redirect = GatewayRedirect::build(self.config, &pending, total_items)?;
                let order = self.fetch_order(identity.user_id, order_id).await?;
                tracing::info!(%order_id, %merchant_ref, "order pending gateway payment");
                Ok(CheckoutOutcome::AwaitingPayment { order, redirect })
            }
        }
    }

    async fn fetch_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        db::OrderRepository::new(self.pool, self.config.currency)
            .get(user_id, order_id)
            .await?
            .ok_or_else(|| StoreError::NotFound("Order".to_owned()))
    }
}

/// Flat shipping fee, waived entirely at or above the free-shipping
/// threshold.
#[must_use]
pub fn shipping_cost(subtotal: Decimal, config: &ShippingConfig) -> Decimal {
    if subtotal >= config.free_threshold {
        Decimal::ZERO
    } else {
        config.flat_fee
    }
}

/// Mint a merchant reference: monotonic component plus the user identity
/// plus a random suffix, so retries within the same second cannot collide.
/// Unique across all orders (backed by a UNIQUE constraint) and safe to use
/// as an idempotency key with the payment processor.
#[must_use]
pub fn mint_merchant_ref(user_id: UserId) -> String {
    let suffix: u16 = rand::rng().random();
    format!("ORDER_{}_{}_{suffix:04x}", Utc::now().timestamp(), user_id)
}
