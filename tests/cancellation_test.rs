//! Integration tests for customer cancellation and pharmacist deletion.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::{eventually, TestApp};
use pharmacy_order_api::{
    entities::{pharmacy_product, OrderStatus},
    errors::ServiceError,
    services::{
        checkout::{CheckoutReceipt, CheckoutRequest, DeliverySelection},
        payment_proof::ProofUpload,
    },
};
use rust_decimal_macros::dec;
use uuid::Uuid;

struct Placed {
    user_id: Uuid,
    pharmacist_id: Uuid,
    listing: pharmacy_product::Model,
    receipt: CheckoutReceipt,
}

impl Placed {
    fn detail_id(&self) -> Uuid {
        self.receipt.order_detail_ids[0]
    }
}

/// Three units of a 10-unit listing, so stock sits at 7 after checkout.
async fn place_order(app: &TestApp) -> Placed {
    let user_id = Uuid::new_v4();
    let pharmacist_id = Uuid::new_v4();
    let apotek = app.seed_pharmacy(pharmacist_id, "Apotek Sehat").await;
    let listing = app
        .seed_listing(apotek.id, "Ibuprofen 400mg", dec!(12000), 10)
        .await;
    let item = app.seed_cart_item(user_id, listing.id, 3).await;
    app.seed_address(user_id).await;
    app.seed_quote(user_id, apotek.id, "regular", dec!(9000)).await;

    let snapshot = app
        .state
        .services
        .cart
        .prepare_checkout(user_id, &[item.id])
        .await
        .expect("snapshot");
    let receipt = app
        .state
        .services
        .checkout
        .checkout(
            user_id,
            CheckoutRequest {
                snapshot_id: snapshot.id,
                deliveries: vec![DeliverySelection {
                    pharmacy_id: apotek.id,
                    option_id: "regular".to_string(),
                }],
            },
        )
        .await
        .expect("checkout");

    Placed {
        user_id,
        pharmacist_id,
        listing,
        receipt,
    }
}

async fn advance_to_processing(app: &TestApp, placed: &Placed) {
    app.state
        .services
        .order_status
        .upload_payment_proof(
            placed.user_id,
            placed.receipt.order_id,
            ProofUpload::new("application/pdf", b"%PDF-1.4 transfer".to_vec()),
        )
        .await
        .expect("upload proof");
    let detail_id = placed.detail_id();
    assert!(
        eventually(Duration::from_secs(3), || async move {
            app.detail_status(detail_id).await == OrderStatus::Processing
        })
        .await
    );
}

#[tokio::test]
async fn customer_cancels_pending_order_without_restock() {
    let app = TestApp::new().await;
    let placed = place_order(&app).await;
    assert_eq!(app.stock(placed.listing.id).await, 7);

    app.state
        .services
        .cancellation
        .cancel_by_user(placed.user_id, placed.receipt.order_id)
        .await
        .expect("cancel");

    assert_eq!(
        app.detail_status(placed.detail_id()).await,
        OrderStatus::Cancelled
    );
    assert_eq!(app.stock(placed.listing.id).await, 7);
}

#[tokio::test]
async fn customer_cancels_processing_order() {
    let app = TestApp::new().await;
    let _consumers = app.start_consumers();
    let placed = place_order(&app).await;
    advance_to_processing(&app, &placed).await;

    app.state
        .services
        .cancellation
        .cancel_by_user(placed.user_id, placed.receipt.order_id)
        .await
        .expect("cancel");

    assert_eq!(
        app.detail_status(placed.detail_id()).await,
        OrderStatus::Cancelled
    );
    app.stop_consumers();
}

#[tokio::test]
async fn shipped_order_cannot_be_cancelled() {
    let app = TestApp::with_delays(Duration::from_millis(50), Duration::from_secs(60)).await;
    let _consumers = app.start_consumers();
    let placed = place_order(&app).await;
    advance_to_processing(&app, &placed).await;
    app.state
        .services
        .order_status
        .ship(placed.pharmacist_id, placed.detail_id())
        .await
        .expect("ship");

    let by_customer = app
        .state
        .services
        .cancellation
        .cancel_by_user(placed.user_id, placed.receipt.order_id)
        .await;
    assert_matches!(by_customer, Err(ServiceError::InvalidStatus(_)));

    let by_pharmacist = app
        .state
        .services
        .cancellation
        .delete_order(placed.pharmacist_id, placed.detail_id())
        .await;
    assert_matches!(by_pharmacist, Err(ServiceError::InvalidStatus(_)));

    assert_eq!(
        app.detail_status(placed.detail_id()).await,
        OrderStatus::Shipped
    );
    assert_eq!(app.stock(placed.listing.id).await, 7);
    app.stop_consumers();
}

#[tokio::test]
async fn delivered_order_cannot_be_cancelled() {
    let app = TestApp::with_delays(Duration::from_millis(50), Duration::from_secs(60)).await;
    let _consumers = app.start_consumers();
    let placed = place_order(&app).await;
    advance_to_processing(&app, &placed).await;
    let status = &app.state.services.order_status;
    status
        .ship(placed.pharmacist_id, placed.detail_id())
        .await
        .expect("ship");
    status
        .confirm_delivery(placed.user_id, placed.detail_id())
        .await
        .expect("confirm delivery");

    let by_customer = app
        .state
        .services
        .cancellation
        .cancel_by_user(placed.user_id, placed.receipt.order_id)
        .await;
    assert_matches!(by_customer, Err(ServiceError::InvalidStatus(_)));

    let by_pharmacist = app
        .state
        .services
        .cancellation
        .delete_order(placed.pharmacist_id, placed.detail_id())
        .await;
    assert_matches!(by_pharmacist, Err(ServiceError::InvalidStatus(_)));

    let detail = app.detail(placed.detail_id()).await;
    assert_eq!(detail.status, OrderStatus::Delivered);
    assert!(detail.deleted_at.is_none());
    assert_eq!(app.stock(placed.listing.id).await, 7);
    app.stop_consumers();
}

#[tokio::test]
async fn customer_cannot_cancel_someone_elses_order() {
    let app = TestApp::new().await;
    let placed = place_order(&app).await;

    let result = app
        .state
        .services
        .cancellation
        .cancel_by_user(Uuid::new_v4(), placed.receipt.order_id)
        .await;

    assert_matches!(result, Err(ServiceError::NotFound(_)));
    assert_eq!(
        app.detail_status(placed.detail_id()).await,
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn pharmacist_delete_restocks_and_hides_the_detail() {
    let app = TestApp::new().await;
    let placed = place_order(&app).await;

    app.state
        .services
        .cancellation
        .delete_order(placed.pharmacist_id, placed.detail_id())
        .await
        .expect("delete");

    let detail = app.detail(placed.detail_id()).await;
    assert_eq!(detail.status, OrderStatus::Cancelled);
    assert!(detail.deleted_at.is_some());
    assert_eq!(app.stock(placed.listing.id).await, 10);

    let lines = app.line_items(placed.detail_id()).await;
    assert_eq!(lines.len(), 1);
    assert!(lines[0].deleted_at.is_some());

    // Gone from the pharmacist's view and not deletable twice
    let listed = app
        .state
        .services
        .orders
        .list_for_pharmacist(placed.pharmacist_id, None, 1, 20)
        .await
        .unwrap();
    assert_eq!(listed.total, 0);

    let again = app
        .state
        .services
        .cancellation
        .delete_order(placed.pharmacist_id, placed.detail_id())
        .await;
    assert_matches!(again, Err(ServiceError::NotFound(_)));
    assert_eq!(app.stock(placed.listing.id).await, 10);
}

#[tokio::test]
async fn pharmacist_of_another_pharmacy_is_forbidden() {
    let app = TestApp::new().await;
    let placed = place_order(&app).await;
    let outsider = Uuid::new_v4();
    app.seed_pharmacy(outsider, "Apotek Lain").await;

    let result = app
        .state
        .services
        .cancellation
        .delete_order(outsider, placed.detail_id())
        .await;

    assert_matches!(result, Err(ServiceError::Forbidden(_)));
    assert_eq!(
        app.detail_status(placed.detail_id()).await,
        OrderStatus::Pending
    );
    assert_eq!(app.stock(placed.listing.id).await, 7);
}
