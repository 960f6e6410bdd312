//! Integration tests for the cart: add/merge, quantity updates, removal,
//! and the session boundary.

use rust_decimal::Decimal;

use kasuwa_core::{CartLineId, PaymentMethod, ProductId, ProductStatus};
use kasuwa_integration_tests::{seed_product, seed_user, test_shipping, test_store};
use kasuwa_store::session::SessionContext;
use kasuwa_store::StoreError;

// ============================================================================
// Adding & Merging
// ============================================================================

#[tokio::test]
async fn test_add_then_add_again_merges_into_one_line() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Indigo Wrapper", Decimal::new(2500, 2), 10).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();

    let first = store.cart().add(&ctx, &csrf, product, 2).await.expect("first add");
    assert_eq!(first.quantity, 2);
    assert_eq!(first.cart_count, 2);

    let second = store.cart().add(&ctx, &csrf, product, 3).await.expect("second add");
    assert_eq!(second.quantity, 5, "quantities merge, not duplicate lines");
    assert_eq!(second.cart_count, 5);

    let lines = store.cart().snapshot(&ctx).await.expect("snapshot");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 5);
    assert_eq!(lines[0].product_name, "Indigo Wrapper");
}

#[tokio::test]
async fn test_add_zero_quantity_is_rejected() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Indigo Wrapper", Decimal::new(2500, 2), 10).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();

    let err = store.cart().add(&ctx, &csrf, product, 0).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn test_add_beyond_stock_leaves_cart_unchanged() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Kola Basket", Decimal::new(1500, 2), 5).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();

    store.cart().add(&ctx, &csrf, product, 4).await.expect("initial add");

    // 4 in the cart + 3 more would exceed the 5 on hand.
    let err = store.cart().add(&ctx, &csrf, product, 3).await.unwrap_err();
    match err {
        StoreError::InsufficientStock {
            requested,
            available,
            ref name,
            ..
        } => {
            assert_eq!(requested, 3);
            assert_eq!(available, 1, "room left for exactly one more");
            assert_eq!(name, "Kola Basket");
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // No partial application: the line still holds 4.
    let lines = store.cart().snapshot(&ctx).await.expect("snapshot");
    assert_eq!(lines[0].quantity, 4);
}

#[tokio::test]
async fn test_add_unknown_or_inactive_product_is_not_found() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let inactive = kasuwa_integration_tests::seed_product_with_status(
        &store,
        "Retired Lamp",
        Decimal::new(999, 2),
        3,
        "inactive",
    )
    .await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();

    let err = store.cart().add(&ctx, &csrf, ProductId::new(9999), 1).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let err = store.cart().add(&ctx, &csrf, inactive, 1).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

// ============================================================================
// Quantity Updates & Removal
// ============================================================================

#[tokio::test]
async fn test_set_quantity_zero_removes_the_line() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Shea Butter", Decimal::new(800, 2), 10).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();

    store.cart().add(&ctx, &csrf, product, 2).await.expect("add");
    let line_id = store.cart().snapshot(&ctx).await.expect("snapshot")[0].id;

    let mutation = store
        .cart()
        .set_quantity(&ctx, &csrf, line_id, 0)
        .await
        .expect("set to zero");
    assert_eq!(mutation.quantity, 0);
    assert_eq!(mutation.cart_count, 0);
    assert!(store.cart().snapshot(&ctx).await.expect("snapshot").is_empty());
}

#[tokio::test]
async fn test_set_quantity_beyond_stock_leaves_line_unchanged() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Shea Butter", Decimal::new(800, 2), 5).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();

    store.cart().add(&ctx, &csrf, product, 2).await.expect("add");
    let line_id = store.cart().snapshot(&ctx).await.expect("snapshot")[0].id;

    let err = store
        .cart()
        .set_quantity(&ctx, &csrf, line_id, 6)
        .await
        .unwrap_err();
    match err {
        StoreError::InsufficientStock {
            requested,
            available,
            ..
        } => {
            assert_eq!(requested, 6);
            assert_eq!(available, 5);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    let lines = store.cart().snapshot(&ctx).await.expect("snapshot");
    assert_eq!(lines[0].quantity, 2);
}

#[tokio::test]
async fn test_remove_and_clear_are_idempotent() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Raffia Fan", Decimal::new(450, 2), 10).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();

    store.cart().add(&ctx, &csrf, product, 1).await.expect("add");
    let line_id = store.cart().snapshot(&ctx).await.expect("snapshot")[0].id;

    store.cart().remove(&ctx, &csrf, line_id).await.expect("remove");
    store
        .cart()
        .remove(&ctx, &csrf, line_id)
        .await
        .expect("removing an absent line succeeds");
    store
        .cart()
        .remove(&ctx, &csrf, CartLineId::new(424_242))
        .await
        .expect("removing a never-existing line succeeds");

    store.cart().clear(&ctx, &csrf).await.expect("clear");
    store.cart().clear(&ctx, &csrf).await.expect("clearing an empty cart succeeds");
}

// ============================================================================
// Totals & Isolation
// ============================================================================

#[tokio::test]
async fn test_count_and_total_reflect_current_prices() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let wrapper = seed_product(&store, "Indigo Wrapper", Decimal::new(2500, 2), 10).await;
    let basket = seed_product(&store, "Kola Basket", Decimal::new(1000, 2), 10).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();

    store.cart().add(&ctx, &csrf, wrapper, 2).await.expect("add wrapper");
    store.cart().add(&ctx, &csrf, basket, 3).await.expect("add basket");

    assert_eq!(store.cart().count(&ctx).await.expect("count"), 5);

    // 2 * 25.00 + 3 * 10.00 = 80.00
    let total = store.cart().total(&ctx).await.expect("total");
    assert_eq!(total.amount, Decimal::new(8000, 2));
}

#[tokio::test]
async fn test_deactivated_product_line_stays_visible_and_removable() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let wrapper = seed_product(&store, "Indigo Wrapper", Decimal::new(2500, 2), 10).await;
    let lamp = seed_product(&store, "Brass Lamp", Decimal::new(999, 2), 3).await;

    let ctx = SessionContext::authenticated(user);
    let csrf = ctx.csrf_token().to_owned();
    store.cart().add(&ctx, &csrf, wrapper, 2).await.expect("add wrapper");
    store.cart().add(&ctx, &csrf, lamp, 1).await.expect("add lamp");

    sqlx::query("UPDATE products SET status = 'inactive' WHERE id = ?1")
        .bind(lamp)
        .execute(store.pool())
        .await
        .expect("deactivate");

    // The line does not vanish: the owner still sees it, marked
    // unavailable, and the badge count still includes it.
    let lines = store.cart().snapshot(&ctx).await.expect("snapshot");
    assert_eq!(lines.len(), 2);
    let lamp_line = lines
        .iter()
        .find(|l| l.product_id == lamp)
        .expect("deactivated line still listed");
    assert_eq!(lamp_line.product_status, ProductStatus::Inactive);
    assert_eq!(lamp_line.available_stock, 0, "nothing purchasable");
    assert_eq!(store.cart().count(&ctx).await.expect("count"), 3);

    // Removing the dead line unblocks checkout.
    store.cart().remove(&ctx, &csrf, lamp_line.id).await.expect("remove");
    store
        .checkout()
        .place_order(&ctx, &csrf, &test_shipping(), PaymentMethod::Cod)
        .await
        .expect("checkout after removing the deactivated line");
}

#[tokio::test]
async fn test_carts_are_isolated_per_user() {
    let store = test_store().await;
    let ada = seed_user(&store, "ada@example.com").await;
    let bayo = seed_user(&store, "bayo@example.com").await;
    let product = seed_product(&store, "Indigo Wrapper", Decimal::new(2500, 2), 10).await;

    let ada_ctx = SessionContext::authenticated(ada);
    let ada_csrf = ada_ctx.csrf_token().to_owned();
    store.cart().add(&ada_ctx, &ada_csrf, product, 2).await.expect("add");

    let bayo_ctx = SessionContext::authenticated(bayo);
    assert_eq!(store.cart().count(&bayo_ctx).await.expect("count"), 0);

    // Bayo cannot modify Ada's line.
    let ada_line = store.cart().snapshot(&ada_ctx).await.expect("snapshot")[0].id;
    let bayo_csrf = bayo_ctx.csrf_token().to_owned();
    let err = store
        .cart()
        .set_quantity(&bayo_ctx, &bayo_csrf, ada_line, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

// ============================================================================
// Session Boundary
// ============================================================================

#[tokio::test]
async fn test_anonymous_sessions_are_unauthorized() {
    let store = test_store().await;
    let product = seed_product(&store, "Indigo Wrapper", Decimal::new(2500, 2), 10).await;

    let ctx = SessionContext::anonymous();
    let csrf = ctx.csrf_token().to_owned();

    let err = store.cart().add(&ctx, &csrf, product, 1).await.unwrap_err();
    assert!(matches!(err, StoreError::Unauthorized));
    let err = store.cart().count(&ctx).await.unwrap_err();
    assert!(matches!(err, StoreError::Unauthorized));
}

#[tokio::test]
async fn test_wrong_csrf_token_is_forbidden() {
    let store = test_store().await;
    let user = seed_user(&store, "ada@example.com").await;
    let product = seed_product(&store, "Indigo Wrapper", Decimal::new(2500, 2), 10).await;

    let ctx = SessionContext::authenticated(user);

    let err = store
        .cart()
        .add(&ctx, "not-the-token", product, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Forbidden));
}
