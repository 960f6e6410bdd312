//! Integration tests for deferred settlement: the gateway handoff, the
//! confirmation callback, replay protection, and the no-hold race on the
//! last unit of stock.

use rust_decimal::Decimal;

use kasuwa_core::{OrderStatus, PaymentMethod};
use kasuwa_integration_tests::{seed_product, seed_user, stock_on_hand, test_shipping, test_store};
use kasuwa_store::models::Order;
use kasuwa_store::services::{CheckoutOutcome, GatewayRedirect, PaymentConfirmation, PaymentOutcome};
use kasuwa_store::session::SessionContext;
use kasuwa_store::{Store, StoreError};

async fn place_deferred_order(
    store: &Store,
    ctx: &SessionContext,
    csrf: &str,
    method: PaymentMethod,
) -> (Order, GatewayRedirect) {
    let outcome = store
        .checkout()
        .place_order(ctx, csrf, &test_shipping(), method)
        .await
        .expect("checkout");
    match outcome {
        CheckoutOutcome::AwaitingPayment { order, redirect } => (order, redirect),
        CheckoutOutcome::Completed { .. } => panic!("card/transfer defers settlement"),
    }
}

fn gateway_field<'a>(redirect: &'a GatewayRedirect, name: &str) -> &'a str {
    redirect
        .fields
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .unwrap_or_else(|| panic!("missing gateway field {name}"))
}

// ============================================================================
// Handoff
// ============================================================================

#[tokio::test]
async fn test_card_checkout_defers_settlement() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Indigo Wrapper", Decimal::new(2000, 2), 5).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();
    store.cart().add(&ctx, &csrf, product, 2).await.expect("add");

    let (order, redirect) = place_deferred_order(&store, &ctx, &csrf, PaymentMethod::Card).await;

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount.amount, Decimal::new(5000, 2));

    // No stock committed and the cart survives until confirmation.
    assert_eq!(stock_on_hand(&store, product).await, 5);
    assert_eq!(store.cart().count(&ctx).await.expect("count"), 2);

    // The gateway form carries the amount in minor units.
    assert_eq!(gateway_field(&redirect, "amount"), "5000");
    assert_eq!(gateway_field(&redirect, "currency"), "NGN");
    assert_eq!(gateway_field(&redirect, "merchant_ref"), order.merchant_ref);
    assert_eq!(gateway_field(&redirect, "email_address"), "ada@example.com");

    // The handoff is durable, not session state.
    let pending: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_payments")
        .fetch_one(store.pool())
        .await
        .expect("count pending");
    assert_eq!(pending, 1);
}

// ============================================================================
// Confirmation
// ============================================================================

#[tokio::test]
async fn test_successful_confirmation_settles_the_order() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Indigo Wrapper", Decimal::new(2000, 2), 5).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();
    store.cart().add(&ctx, &csrf, product, 2).await.expect("add");
    let (order, _) = place_deferred_order(&store, &ctx, &csrf, PaymentMethod::Transfer).await;

    let confirmation = store
        .payments()
        .confirm(&ctx, order.id, &order.merchant_ref, PaymentOutcome::Successful)
        .await
        .expect("confirm");

    let PaymentConfirmation::Confirmed(settled) = confirmation else {
        panic!("expected Confirmed");
    };
    assert_eq!(settled.status, OrderStatus::Processing);
    assert_eq!(stock_on_hand(&store, product).await, 3);
    assert_eq!(store.cart().count(&ctx).await.expect("count"), 0);

    // The single-use ticket is gone.
    let pending: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_payments")
        .fetch_one(store.pool())
        .await
        .expect("count pending");
    assert_eq!(pending, 0);
}

#[tokio::test]
async fn test_failed_payment_voids_order_but_keeps_cart() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Indigo Wrapper", Decimal::new(2000, 2), 5).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();
    store.cart().add(&ctx, &csrf, product, 2).await.expect("add");
    let (order, _) = place_deferred_order(&store, &ctx, &csrf, PaymentMethod::Card).await;

    let confirmation = store
        .payments()
        .confirm(&ctx, order.id, &order.merchant_ref, PaymentOutcome::Failed)
        .await
        .expect("confirm");

    assert!(matches!(
        confirmation,
        PaymentConfirmation::Declined(OrderStatus::PaymentFailed)
    ));
    assert_eq!(stock_on_hand(&store, product).await, 5);
    assert_eq!(
        store.cart().count(&ctx).await.expect("count"),
        2,
        "cart survives so the customer can retry",
    );
}

#[tokio::test]
async fn test_cancelled_payment_cancels_the_order() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Indigo Wrapper", Decimal::new(2000, 2), 5).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();
    store.cart().add(&ctx, &csrf, product, 1).await.expect("add");
    let (order, _) = place_deferred_order(&store, &ctx, &csrf, PaymentMethod::Card).await;

    let confirmation = store
        .payments()
        .confirm(&ctx, order.id, &order.merchant_ref, PaymentOutcome::Cancelled)
        .await
        .expect("confirm");

    assert!(matches!(
        confirmation,
        PaymentConfirmation::Declined(OrderStatus::Cancelled)
    ));

    let fetched = store
        .orders()
        .get(user, order.id)
        .await
        .expect("get")
        .expect("order exists");
    assert_eq!(fetched.status, OrderStatus::Cancelled);
}

// ============================================================================
// Replay Protection
// ============================================================================

#[tokio::test]
async fn test_duplicate_success_callback_is_a_noop() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Indigo Wrapper", Decimal::new(2000, 2), 5).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();
    store.cart().add(&ctx, &csrf, product, 2).await.expect("add");
    let (order, _) = place_deferred_order(&store, &ctx, &csrf, PaymentMethod::Transfer).await;

    store
        .payments()
        .confirm(&ctx, order.id, &order.merchant_ref, PaymentOutcome::Successful)
        .await
        .expect("first confirm");

    let second = store
        .payments()
        .confirm(&ctx, order.id, &order.merchant_ref, PaymentOutcome::Successful)
        .await
        .expect("second confirm");
    assert!(matches!(second, PaymentConfirmation::AlreadyConfirmed));

    // Stock decremented exactly once.
    assert_eq!(stock_on_hand(&store, product).await, 3);
}

#[tokio::test]
async fn test_duplicate_failure_callback_is_a_noop() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Indigo Wrapper", Decimal::new(2000, 2), 5).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();
    store.cart().add(&ctx, &csrf, product, 2).await.expect("add");
    let (order, _) = place_deferred_order(&store, &ctx, &csrf, PaymentMethod::Card).await;

    store
        .payments()
        .confirm(&ctx, order.id, &order.merchant_ref, PaymentOutcome::Failed)
        .await
        .expect("first confirm");

    // Gateways retry callbacks; repeating the same outcome changes nothing.
    let second = store
        .payments()
        .confirm(&ctx, order.id, &order.merchant_ref, PaymentOutcome::Failed)
        .await
        .expect("second confirm");
    assert!(matches!(
        second,
        PaymentConfirmation::Declined(OrderStatus::PaymentFailed)
    ));

    let fetched = store
        .orders()
        .get(user, order.id)
        .await
        .expect("get")
        .expect("order exists");
    assert_eq!(fetched.status, OrderStatus::PaymentFailed);
    assert_eq!(stock_on_hand(&store, product).await, 5);
    assert_eq!(store.cart().count(&ctx).await.expect("count"), 2);
}

#[tokio::test]
async fn test_conflicting_callback_after_settlement_is_a_replay() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Indigo Wrapper", Decimal::new(2000, 2), 5).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();
    store.cart().add(&ctx, &csrf, product, 1).await.expect("add");
    let (order, _) = place_deferred_order(&store, &ctx, &csrf, PaymentMethod::Card).await;

    store
        .payments()
        .confirm(&ctx, order.id, &order.merchant_ref, PaymentOutcome::Successful)
        .await
        .expect("confirm");

    // A late "failed" callback must not unwind the settled order.
    let err = store
        .payments()
        .confirm(&ctx, order.id, &order.merchant_ref, PaymentOutcome::Failed)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::PaymentReplay { .. }));

    let fetched = store
        .orders()
        .get(user, order.id)
        .await
        .expect("get")
        .expect("order exists");
    assert_eq!(fetched.status, OrderStatus::Processing);
}

#[tokio::test]
async fn test_mismatched_merchant_ref_is_rejected_without_side_effects() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Indigo Wrapper", Decimal::new(2000, 2), 5).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();
    store.cart().add(&ctx, &csrf, product, 1).await.expect("add");
    let (order, _) = place_deferred_order(&store, &ctx, &csrf, PaymentMethod::Card).await;

    let err = store
        .payments()
        .confirm(&ctx, order.id, "ORDER_0_0_beef", PaymentOutcome::Successful)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::PaymentReplay { .. }));

    assert_eq!(stock_on_hand(&store, product).await, 5);
    let fetched = store
        .orders()
        .get(user, order.id)
        .await
        .expect("get")
        .expect("order exists");
    assert_eq!(fetched.status, OrderStatus::Pending, "order still awaits its real callback");
}

#[tokio::test]
async fn test_confirming_another_users_order_is_not_found() {
    let store = test_store().await;
    let ada = seed_user(&store, "ada@example.com").await;
    let bayo = seed_user(&store, "bayo@example.com").await;
    let product = seed_product(&store, "Indigo Wrapper", Decimal::new(2000, 2), 5).await;

    let ada_ctx = SessionContext::authenticated(ada);
    let ada_csrf = ada_ctx.csrf_token().to_owned();
    store.cart().add(&ada_ctx, &ada_csrf, product, 1).await.expect("add");
    let (order, _) = place_deferred_order(&store, &ada_ctx, &ada_csrf, PaymentMethod::Card).await;

    let bayo_ctx = SessionContext::authenticated(bayo);
    let err = store
        .payments()
        .confirm(&bayo_ctx, order.id, &order.merchant_ref, PaymentOutcome::Successful)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

// ============================================================================
// The No-Hold Race
// ============================================================================

#[tokio::test]
async fn test_losing_a_race_for_the_last_unit_fails_the_order() {
    let store = test_store().await;
    let ada = seed_user(&store, "ada@example.com").await;
    let bayo = seed_user(&store, "bayo@example.com").await;
    let product = seed_product(&store, "Bronze Mask", Decimal::new(15000, 2), 1).await;

    // Both customers check out the last unit; neither holds it.
    let ada_ctx = SessionContext::authenticated(ada);
    let ada_csrf = ada_ctx.csrf_token().to_owned();
    store.cart().add(&ada_ctx, &ada_csrf, product, 1).await.expect("add");
    let (ada_order, _) = place_deferred_order(&store, &ada_ctx, &ada_csrf, PaymentMethod::Card).await;

    let bayo_ctx = SessionContext::authenticated(bayo);
    let bayo_csrf = bayo_ctx.csrf_token().to_owned();
    store.cart().add(&bayo_ctx, &bayo_csrf, product, 1).await.expect("add");
    let (bayo_order, _) =
        place_deferred_order(&store, &bayo_ctx, &bayo_csrf, PaymentMethod::Card).await;

    assert_eq!(stock_on_hand(&store, product).await, 1, "no reservation held");

    // Ada's payment lands first and takes the unit.
    let first = store
        .payments()
        .confirm(&ada_ctx, ada_order.id, &ada_order.merchant_ref, PaymentOutcome::Successful)
        .await
        .expect("ada confirm");
    assert!(matches!(first, PaymentConfirmation::Confirmed(_)));
    assert_eq!(stock_on_hand(&store, product).await, 0);

    // Bayo's payment also succeeded at the gateway, but the goods are gone.
    let second = store
        .payments()
        .confirm(&bayo_ctx, bayo_order.id, &bayo_order.merchant_ref, PaymentOutcome::Successful)
        .await
        .expect("bayo confirm");

    let PaymentConfirmation::StockExhausted(violations) = second else {
        panic!("expected StockExhausted");
    };
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].name, "Bronze Mask");
    assert_eq!(violations[0].available, 0);

    // Bayo's order failed rather than overselling; stock stays at zero.
    assert_eq!(stock_on_hand(&store, product).await, 0);
    let bayo_fetched = store
        .orders()
        .get(bayo, bayo_order.id)
        .await
        .expect("get")
        .expect("order exists");
    assert_eq!(bayo_fetched.status, OrderStatus::PaymentFailed);

    // Bayo's cart survives for when stock returns.
    assert_eq!(store.cart().count(&bayo_ctx).await.expect("count"), 1);
}
