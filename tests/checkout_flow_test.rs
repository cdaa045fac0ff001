//! Integration tests for cart snapshots and the checkout transaction.
//!
//! Tests cover:
//! - Snapshot grouping by pharmacy
//! - Order, order detail and line item creation with stock decrement
//! - Full rollback when products are inactive or out of stock
//! - Delivery selection validation
//! - Expired snapshots, missing addresses and vanished cart lines

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use pharmacy_order_api::{
    entities::{pharmacy, pharmacy_product, OrderStatus},
    errors::ServiceError,
    services::{
        cart_snapshot::CartSnapshot,
        checkout::{CheckoutRequest, DeliverySelection},
    },
};
use rust_decimal_macros::dec;
use uuid::Uuid;

struct Basket {
    user_id: Uuid,
    apotek_a: pharmacy::Model,
    apotek_b: pharmacy::Model,
    vitamin: pharmacy_product::Model,
    syrup: pharmacy_product::Model,
    vitamin_item: Uuid,
    syrup_item: Uuid,
}

/// Two pharmacies, one cart line each, delivery quotes cached for both.
async fn basket(app: &TestApp) -> Basket {
    let user_id = Uuid::new_v4();
    let apotek_a = app.seed_pharmacy(Uuid::new_v4(), "Apotek Sehat").await;
    let apotek_b = app.seed_pharmacy(Uuid::new_v4(), "Apotek Prima").await;
    let vitamin = app
        .seed_listing(apotek_a.id, "Vitamin C 500mg", dec!(25000), 10)
        .await;
    let syrup = app
        .seed_listing(apotek_b.id, "Cough Syrup 60ml", dec!(9000), 4)
        .await;

    let vitamin_item = app.seed_cart_item(user_id, vitamin.id, 2).await.id;
    let syrup_item = app.seed_cart_item(user_id, syrup.id, 1).await.id;

    app.seed_address(user_id).await;
    app.seed_quote(user_id, apotek_a.id, "regular", dec!(9000)).await;
    app.seed_quote(user_id, apotek_a.id, "instant", dec!(20000)).await;
    app.seed_quote(user_id, apotek_b.id, "regular", dec!(5000)).await;

    Basket {
        user_id,
        apotek_a,
        apotek_b,
        vitamin,
        syrup,
        vitamin_item,
        syrup_item,
    }
}

async fn snapshot(app: &TestApp, user_id: Uuid, items: &[Uuid]) -> CartSnapshot {
    app.state
        .services
        .cart
        .prepare_checkout(user_id, items)
        .await
        .expect("snapshot")
}

fn select(snapshot_id: Uuid, choices: &[(Uuid, &str)]) -> CheckoutRequest {
    CheckoutRequest {
        snapshot_id,
        deliveries: choices
            .iter()
            .map(|(pharmacy_id, option_id)| DeliverySelection {
                pharmacy_id: *pharmacy_id,
                option_id: option_id.to_string(),
            })
            .collect(),
    }
}

#[tokio::test]
async fn snapshot_groups_lines_by_pharmacy_in_selection_order() {
    let app = TestApp::new().await;
    let b = basket(&app).await;
    let extra = app
        .seed_listing(b.apotek_a.id, "Zinc 20mg", dec!(12000), 3)
        .await;
    let extra_item = app.seed_cart_item(b.user_id, extra.id, 3).await.id;

    let snap = snapshot(&app, b.user_id, &[b.syrup_item, b.vitamin_item, extra_item]).await;

    assert_eq!(snap.groups.len(), 2);
    assert_eq!(snap.groups[0].pharmacy_id, b.apotek_b.id);
    assert_eq!(snap.groups[0].pharmacy_name, "Apotek Prima");
    assert_eq!(snap.groups[1].pharmacy_id, b.apotek_a.id);
    assert_eq!(snap.groups[1].items.len(), 2);
    assert_eq!(snap.groups[1].subtotal(), dec!(86000));
    assert_eq!(snap.items_total(), dec!(95000));
}

#[tokio::test]
async fn snapshot_rejects_lines_of_another_user() {
    let app = TestApp::new().await;
    let b = basket(&app).await;

    let result = app
        .state
        .services
        .cart
        .prepare_checkout(Uuid::new_v4(), &[b.vitamin_item])
        .await;

    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn checkout_creates_one_pending_detail_per_pharmacy() {
    let app = TestApp::new().await;
    let b = basket(&app).await;
    let snap = snapshot(&app, b.user_id, &[b.vitamin_item, b.syrup_item]).await;

    let receipt = app
        .state
        .services
        .checkout
        .checkout(
            b.user_id,
            select(snap.id, &[(b.apotek_a.id, "regular"), (b.apotek_b.id, "regular")]),
        )
        .await
        .expect("checkout succeeds");

    // 2 x 25000 + 1 x 9000 + fees 9000 and 5000
    assert_eq!(receipt.total_price, dec!(73000));
    assert_eq!(receipt.order_detail_ids.len(), 2);
    assert_eq!(app.order_count().await, 1);
    assert_eq!(app.detail_count().await, 2);

    for id in &receipt.order_detail_ids {
        let detail = app.detail(*id).await;
        assert_eq!(detail.status, OrderStatus::Pending);
        assert_eq!(detail.order_id, receipt.order_id);
        assert_eq!(detail.delivery_option, "regular");
    }

    let lines = app.line_items(receipt.order_detail_ids[0]).await;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].pharmacy_product_id, b.vitamin.id);
    assert_eq!(lines[0].quantity, 2);
    assert_eq!(lines[0].price, dec!(25000));

    assert_eq!(app.stock(b.vitamin.id).await, 8);
    assert_eq!(app.stock(b.syrup.id).await, 3);
}

#[tokio::test]
async fn selling_the_last_units_empties_stock_cart_and_snapshot() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let apotek = app.seed_pharmacy(Uuid::new_v4(), "Apotek Sehat").await;
    let masks = app
        .seed_listing(apotek.id, "Face Mask (50 pcs)", dec!(30000), 5)
        .await;
    let item = app.seed_cart_item(user_id, masks.id, 5).await.id;
    app.seed_address(user_id).await;
    app.seed_quote(user_id, apotek.id, "regular", dec!(9000)).await;

    let snap = snapshot(&app, user_id, &[item]).await;
    let receipt = app
        .state
        .services
        .checkout
        .checkout(user_id, select(snap.id, &[(apotek.id, "regular")]))
        .await
        .expect("checkout succeeds");

    assert_eq!(receipt.total_price, dec!(159000));
    assert_eq!(app.stock(masks.id).await, 0);
    assert!(!app.cart_item_exists(item).await);

    // The snapshot is consumed
    let again = app
        .state
        .services
        .checkout
        .checkout(user_id, select(snap.id, &[(apotek.id, "regular")]))
        .await;
    assert_matches!(again, Err(ServiceError::CartUnavailable));
    assert_eq!(app.order_count().await, 1);
}

#[tokio::test]
async fn insufficient_stock_rolls_back_the_whole_order() {
    let app = TestApp::new().await;
    let b = basket(&app).await;
    let greedy = app.seed_cart_item(b.user_id, b.syrup.id, 6).await.id;
    let snap = snapshot(&app, b.user_id, &[b.vitamin_item, greedy]).await;

    let result = app
        .state
        .services
        .checkout
        .checkout(
            b.user_id,
            select(snap.id, &[(b.apotek_a.id, "regular"), (b.apotek_b.id, "regular")]),
        )
        .await;

    assert_matches!(
        result,
        Err(ServiceError::ProductsUnavailable { ref inactive, ref out_of_stock })
            if inactive.is_empty() && out_of_stock == &vec!["Cough Syrup 60ml".to_string()]
    );
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.detail_count().await, 0);
    assert_eq!(app.line_item_count().await, 0);
    assert_eq!(app.stock(b.vitamin.id).await, 10);
    assert_eq!(app.stock(b.syrup.id).await, 4);
    assert!(app.cart_item_exists(b.vitamin_item).await);
    assert!(app.cart_item_exists(greedy).await);
}

#[tokio::test]
async fn inactive_product_rolls_back_and_is_reported() {
    let app = TestApp::new().await;
    let b = basket(&app).await;
    let snap = snapshot(&app, b.user_id, &[b.vitamin_item, b.syrup_item]).await;

    // Delisted after the snapshot was taken
    app.deactivate_listing(b.vitamin.id).await;

    let result = app
        .state
        .services
        .checkout
        .checkout(
            b.user_id,
            select(snap.id, &[(b.apotek_a.id, "regular"), (b.apotek_b.id, "regular")]),
        )
        .await;

    assert_matches!(
        result,
        Err(ServiceError::ProductsUnavailable { ref inactive, ref out_of_stock })
            if inactive == &vec!["Vitamin C 500mg".to_string()] && out_of_stock.is_empty()
    );
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.line_item_count().await, 0);
    assert_eq!(app.stock(b.vitamin.id).await, 10);
    assert!(app.cart_item_exists(b.syrup_item).await);
}

#[tokio::test]
async fn every_pharmacy_needs_exactly_one_delivery_selection() {
    let app = TestApp::new().await;
    let b = basket(&app).await;
    let snap = snapshot(&app, b.user_id, &[b.vitamin_item, b.syrup_item]).await;
    let checkout = &app.state.services.checkout;

    let missing = checkout
        .checkout(b.user_id, select(snap.id, &[(b.apotek_a.id, "regular")]))
        .await;
    assert_matches!(missing, Err(ServiceError::InvalidDeliveryData(_)));

    let duplicated = checkout
        .checkout(
            b.user_id,
            select(snap.id, &[(b.apotek_a.id, "regular"), (b.apotek_a.id, "instant")]),
        )
        .await;
    assert_matches!(duplicated, Err(ServiceError::InvalidDeliveryData(_)));

    let stranger = checkout
        .checkout(
            b.user_id,
            select(snap.id, &[(b.apotek_a.id, "regular"), (Uuid::new_v4(), "regular")]),
        )
        .await;
    assert_matches!(stranger, Err(ServiceError::InvalidDeliveryData(_)));

    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.stock(b.vitamin.id).await, 10);
}

#[tokio::test]
async fn unknown_delivery_option_is_rejected() {
    let app = TestApp::new().await;
    let b = basket(&app).await;
    let snap = snapshot(&app, b.user_id, &[b.vitamin_item, b.syrup_item]).await;

    // "instant" is only quoted for the first pharmacy
    let result = app
        .state
        .services
        .checkout
        .checkout(
            b.user_id,
            select(snap.id, &[(b.apotek_a.id, "regular"), (b.apotek_b.id, "instant")]),
        )
        .await;

    assert_matches!(result, Err(ServiceError::InvalidDeliveryData(_)));
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn unknown_snapshot_means_cart_unavailable() {
    let app = TestApp::new().await;
    let b = basket(&app).await;

    let result = app
        .state
        .services
        .checkout
        .checkout(b.user_id, select(Uuid::new_v4(), &[(b.apotek_a.id, "regular")]))
        .await;

    assert_matches!(result, Err(ServiceError::CartUnavailable));
}

#[tokio::test]
async fn checkout_requires_an_active_address() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let apotek = app.seed_pharmacy(Uuid::new_v4(), "Apotek Sehat").await;
    let listing = app.seed_listing(apotek.id, "Antacid", dec!(8000), 9).await;
    let item = app.seed_cart_item(user_id, listing.id, 1).await.id;
    let snap = snapshot(&app, user_id, &[item]).await;

    let result = app
        .state
        .services
        .checkout
        .checkout(user_id, select(snap.id, &[(apotek.id, "regular")]))
        .await;

    assert_matches!(result, Err(ServiceError::NoActiveAddress));
    assert_eq!(app.stock(listing.id).await, 9);
}

#[tokio::test]
async fn cart_line_removed_after_snapshot_aborts_checkout() {
    let app = TestApp::new().await;
    let b = basket(&app).await;
    let snap = snapshot(&app, b.user_id, &[b.vitamin_item, b.syrup_item]).await;

    use pharmacy_order_api::entities::cart_item;
    use sea_orm::EntityTrait;
    cart_item::Entity::delete_by_id(b.syrup_item)
        .exec(app.db())
        .await
        .unwrap();

    let result = app
        .state
        .services
        .checkout
        .checkout(
            b.user_id,
            select(snap.id, &[(b.apotek_a.id, "regular"), (b.apotek_b.id, "regular")]),
        )
        .await;

    assert_matches!(result, Err(ServiceError::CartItemMissing(id)) if id == b.syrup_item);
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.stock(b.vitamin.id).await, 10);
    assert!(app.cart_item_exists(b.vitamin_item).await);
}
