//! The Payment Handoff: gateway redirect construction and the confirmation
//! callback that settles or voids a deferred-payment order.
//!
//! The gateway never talks to inventory directly. Confirmation is the single
//! place where a deferred order's stock is decremented, and the pending
//! payment row is the single-use ticket that authorizes it. Every callback
//! beyond the first finds the ticket gone and changes nothing.

use sqlx::SqlitePool;
use tracing::instrument;
use url::Url;

use kasuwa_core::{OrderId, OrderStatus};

use crate::config::StoreConfig;
use crate::db::{cart, orders, products, RepositoryError};
use crate::error::{Result, StockViolation, StoreError};
use crate::models::{Order, PendingPayment};
use crate::session::SessionContext;

/// A browser form-post to the payment gateway's checkout endpoint.
///
/// Rendered as a self-submitting form: `action_url` is the form action and
/// each entry in `fields` becomes a hidden input.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GatewayRedirect {
    pub action_url: String,
    pub fields: Vec<(String, String)>,
}

impl GatewayRedirect {
    /// Build the gateway form for a pending payment.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` if the configured base URL cannot
    /// be parsed into a redirect-back URL.
    pub fn build(
        config: &StoreConfig,
        pending: &PendingPayment,
        total_items: u32,
    ) -> Result<Self> {
        let mut redirect_url = Url::parse(&config.base_url).map_err(|e| {
            StoreError::Validation(vec![format!("invalid base URL {:?}: {e}", config.base_url)])
        })?;
        redirect_url.set_path("/payment/confirm");
        redirect_url
            .query_pairs_mut()
            .append_pair("order_id", &pending.order_id.to_string())
            .append_pair("merchant_ref", &pending.merchant_ref);

        let fields = vec![
            ("public_key".to_owned(), config.gateway.public_key.clone()),
            ("merchant_ref".to_owned(), pending.merchant_ref.clone()),
            (
                "email_address".to_owned(),
                pending.customer_email.as_str().to_owned(),
            ),
            ("name".to_owned(), pending.customer_name.clone()),
            ("phone_number".to_owned(), pending.customer_phone.clone()),
            (
                "request_type".to_owned(),
                config.gateway.request_type.clone(),
            ),
            (
                "description".to_owned(),
                format!("Order payment for {total_items} items"),
            ),
            ("currency".to_owned(), config.currency.code().to_owned()),
            ("amount".to_owned(), pending.amount_minor.to_string()),
            ("redirect_url".to_owned(), redirect_url.into()),
            ("user_bear_charge".to_owned(), "yes".to_owned()),
        ];

        Ok(Self {
            action_url: config.gateway.checkout_url.clone(),
            fields,
        })
    }
}

/// What the gateway reported when the customer came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Successful,
    Failed,
    Cancelled,
}

/// The result of processing a confirmation callback.
#[derive(Debug)]
pub enum PaymentConfirmation {
    /// Payment settled: stock decremented, cart cleared, order now
    /// `Processing`.
    Confirmed(Order),
    /// This callback already ran; nothing changed.
    AlreadyConfirmed,
    /// The gateway reported failure or cancellation; the order is voided
    /// with the given status and the cart is untouched.
    Declined(OrderStatus),
    /// Payment succeeded at the gateway but the goods sold out while it was
    /// in flight. The order is marked `PaymentFailed`; the customer must be
    /// refunded out of band.
    StockExhausted(Vec<StockViolation>),
}

/// Payment Handoff service.
pub struct PaymentService<'a> {
    pool: &'a SqlitePool,
    config: &'a StoreConfig,
}

impl<'a> PaymentService<'a> {
    pub(crate) const fn new(pool: &'a SqlitePool, config: &'a StoreConfig) -> Self {
        Self { pool, config }
    }

    /// Process a gateway confirmation callback.
    ///
    /// The pending-payment row is consumed exactly once. An exact repeat
    /// of the callback that resolved the order is an idempotent no-op;
    /// conflicting or mismatched references are rejected without touching
    /// state. On
    /// success the conditional stock decrement is the final arbiter: if
    /// the goods sold out while payment was in flight, the order fails
    /// rather than overselling.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without a signed-in caller, `NotFound` if the order
    /// does not belong to the caller, `PaymentReplay` for a conflicting or
    /// mismatched reference, or `Repository` if storage fails.
    #[instrument(skip(self, ctx), fields(outcome = ?outcome))]
    pub async fn confirm(
        &self,
        ctx: &SessionContext,
        order_id: OrderId,
        merchant_ref: &str,
        outcome: PaymentOutcome,
    ) -> Result<PaymentConfirmation> {
        let identity = ctx.identity()?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let order = orders::get_in_tx(&mut tx, identity.user_id, order_id, self.config.currency)
            .await?
            .ok_or_else(|| StoreError::NotFound("Order".to_owned()))?;

        let Some(pending) = orders::pending_payment_for_order(&mut tx, order_id).await? else {
            // Ticket already consumed. An exact repeat of the callback that
            // resolved the order is a harmless no-op; anything else is a
            // replay.
            if merchant_ref == order.merchant_ref {
                match (order.status, outcome) {
                    (OrderStatus::Processing, PaymentOutcome::Successful) => {
                        return Ok(PaymentConfirmation::AlreadyConfirmed);
                    }
                    (OrderStatus::PaymentFailed, PaymentOutcome::Failed)
                    | (OrderStatus::Cancelled, PaymentOutcome::Cancelled) => {
                        return Ok(PaymentConfirmation::Declined(order.status));
                    }
                    _ => {}
                }
            }
            tracing::warn!(%order_id, merchant_ref, "callback for consumed payment ticket");
            return Err(StoreError::PaymentReplay { order_id });
        };

        if pending.merchant_ref != merchant_ref {
            tracing::warn!(
                %order_id,
                presented = merchant_ref,
                expected = %pending.merchant_ref,
                "merchant reference mismatch on confirmation",
            );
            return Err(StoreError::PaymentReplay { order_id });
        }

        match outcome {
            PaymentOutcome::Successful => {
                let items = orders::items_in_tx(&mut tx, order_id, self.config.currency).await?;

                let mut violations = Vec::new();
                for item in &items {
                    if !products::decrement_stock(&mut tx, item.product_id, item.quantity).await? {
                        let (name, available) = products::stock_summary_in_tx(
                            &mut tx,
                            item.product_id,
                        )
                        .await?
                        .unwrap_or_else(|| (format!("product {}", item.product_id), 0));
                        violations.push(StockViolation {
                            product_id: item.product_id,
                            name,
                            requested: item.quantity,
                            available,
                        });
                    }
                }

                if violations.is_empty() {
                    let settled = orders::transition_status(
                        &mut tx,
                        order_id,
                        OrderStatus::Pending,
                        OrderStatus::Processing,
                    )
                    .await?;
                    if !settled {
                        // Status moved under us; treat as already handled.
                        return Ok(PaymentConfirmation::AlreadyConfirmed);
                    }
                    cart::clear_in_tx(&mut tx, identity.user_id).await?;
                    orders::delete_pending_payment(&mut tx, merchant_ref).await?;
                    let order =
                        orders::get_in_tx(&mut tx, identity.user_id, order_id, self.config.currency)
                            .await?
                            .ok_or_else(|| StoreError::NotFound("Order".to_owned()))?;
                    tx.commit().await.map_err(RepositoryError::from)?;

                    tracing::info!(%order_id, merchant_ref, "payment confirmed, order settled");
                    Ok(PaymentConfirmation::Confirmed(order))
                } else {
                    // Payment arrived but the goods are gone. The partial
                    // decrements above must not stand, so roll back and
                    // record the failure in a fresh transaction.
                    tx.rollback().await.map_err(RepositoryError::from)?;

                    let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
                    orders::transition_status(
                        &mut tx,
                        order_id,
                        OrderStatus::Pending,
                        OrderStatus::PaymentFailed,
                    )
                    .await?;
                    orders::delete_pending_payment(&mut tx, merchant_ref).await?;
                    tx.commit().await.map_err(RepositoryError::from)?;

                    tracing::warn!(
                        %order_id,
                        merchant_ref,
                        conflicts = violations.len(),
                        "payment confirmed but stock exhausted",
                    );
                    Ok(PaymentConfirmation::StockExhausted(violations))
                }
            }
            PaymentOutcome::Failed | PaymentOutcome::Cancelled => {
                let status = if outcome == PaymentOutcome::Failed {
                    OrderStatus::PaymentFailed
                } else {
                    OrderStatus::Cancelled
                };
                orders::transition_status(&mut tx, order_id, OrderStatus::Pending, status).await?;
                orders::delete_pending_payment(&mut tx, merchant_ref).await?;
                // The cart survives so the customer can try again.
                tx.commit().await.map_err(RepositoryError::from)?;

                tracing::info!(%order_id, merchant_ref, %status, "payment declined, order voided");
                Ok(PaymentConfirmation::Declined(status))
            }
        }
    }
}
