//! End-to-end HTTP tests through the full router.

mod common;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use common::{eventually, multipart_request, response_json, TestApp};
use pharmacy_order_api::entities::{pharmacy, pharmacy_product, OrderStatus};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

struct Shop {
    user_id: Uuid,
    pharmacist_id: Uuid,
    apotek: pharmacy::Model,
    listing: pharmacy_product::Model,
    cart_item: Uuid,
}

async fn shop(app: &TestApp) -> Shop {
    let user_id = Uuid::new_v4();
    let pharmacist_id = Uuid::new_v4();
    let apotek = app.seed_pharmacy(pharmacist_id, "Apotek Sehat").await;
    let listing = app
        .seed_listing(apotek.id, "Paracetamol 500mg", dec!(8000), 10)
        .await;
    let cart_item = app.seed_cart_item(user_id, listing.id, 2).await.id;
    app.seed_address(user_id).await;
    app.seed_quote(user_id, apotek.id, "regular", dec!(9000)).await;
    Shop {
        user_id,
        pharmacist_id,
        apotek,
        listing,
        cart_item,
    }
}

async fn prepare(app: &TestApp, shop: &Shop) -> Value {
    let response = app
        .as_customer(
            shop.user_id,
            Method::POST,
            "/api/v1/cart/checkout",
            Some(json!({ "cart_item_ids": [shop.cart_item] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    body["data"].clone()
}

fn checkout_body(snapshot_id: &Value, pharmacy_id: Uuid, option_id: &str) -> Value {
    json!({
        "snapshot_id": snapshot_id,
        "deliveries": [{ "pharmacy_id": pharmacy_id, "option_id": option_id }],
    })
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let app = TestApp::new().await;

    let response = app
        .request(common::json_request(
            Method::GET,
            "/api/v1/orders",
            None,
            None,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn checkout_over_http_creates_the_order() {
    let app = TestApp::new().await;
    let shop = shop(&app).await;
    let snapshot = prepare(&app, &shop).await;
    assert_eq!(snapshot["groups"].as_array().map(Vec::len), Some(1));

    let response = app
        .as_customer(
            shop.user_id,
            Method::POST,
            "/api/v1/orders",
            Some(checkout_body(&snapshot["id"], shop.apotek.id, "regular")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let order_id = body["data"]["order_id"].as_str().expect("order id").to_string();
    assert_eq!(body["data"]["order_detail_ids"].as_array().map(Vec::len), Some(1));
    assert_eq!(app.stock(shop.listing.id).await, 8);

    let response = app
        .as_customer(
            shop.user_id,
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .as_customer(shop.user_id, Method::GET, "/api/v1/orders", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn unavailable_products_are_listed_in_error_details() {
    let app = TestApp::new().await;
    let shop = shop(&app).await;
    let snapshot = prepare(&app, &shop).await;
    app.deactivate_listing(shop.listing.id).await;

    let response = app
        .as_customer(
            shop.user_id,
            Method::POST,
            "/api/v1/orders",
            Some(checkout_body(&snapshot["id"], shop.apotek.id, "regular")),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(body["code"], "products_unavailable");
    assert_eq!(
        body["details"]["inactive_products"],
        json!(["Paracetamol 500mg"])
    );
    assert_eq!(body["details"]["out_of_stock_products"], json!([]));
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn unknown_delivery_option_is_a_bad_request() {
    let app = TestApp::new().await;
    let shop = shop(&app).await;
    let snapshot = prepare(&app, &shop).await;

    let response = app
        .as_customer(
            shop.user_id,
            Method::POST,
            "/api/v1/orders",
            Some(checkout_body(&snapshot["id"], shop.apotek.id, "teleport")),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["code"], "invalid_delivery_data");
    assert_eq!(app.stock(shop.listing.id).await, 10);
}

#[tokio::test]
async fn payment_proof_upload_is_accepted_and_confirmed_later() {
    let app = TestApp::new().await;
    let _consumers = app.start_consumers();
    let shop = shop(&app).await;
    let snapshot = prepare(&app, &shop).await;
    let response = app
        .as_customer(
            shop.user_id,
            Method::POST,
            "/api/v1/orders",
            Some(checkout_body(&snapshot["id"], shop.apotek.id, "regular")),
        )
        .await;
    let body = response_json(response).await;
    let order_id = body["data"]["order_id"].as_str().expect("order id").to_string();
    let detail_id: Uuid = body["data"]["order_detail_ids"][0]
        .as_str()
        .and_then(|id| id.parse().ok())
        .expect("detail id");

    let response = app
        .request(multipart_request(
            &format!("/api/v1/orders/{}/payment-proof", order_id),
            shop.user_id,
            "image/jpeg",
            &[0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], json!(OrderStatus::Pending));

    let app_ref = &app;
    assert!(
        eventually(Duration::from_secs(3), || async move {
            app_ref.detail_status(detail_id).await == OrderStatus::Processing
        })
        .await
    );

    let response = app
        .as_pharmacist(
            shop.pharmacist_id,
            Method::POST,
            &format!("/api/v1/pharmacist/orders/{}/ship", detail_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    app.stop_consumers();
}

#[tokio::test]
async fn oversized_payment_proof_is_rejected() {
    let app = TestApp::new().await;
    let shop = shop(&app).await;

    let response = app
        .request(multipart_request(
            &format!("/api/v1/orders/{}/payment-proof", Uuid::new_v4()),
            shop.user_id,
            "image/png",
            &vec![0u8; app.config.max_payment_proof_bytes + 128 * 1024],
        ))
        .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn pharmacist_status_filter_is_validated() {
    let app = TestApp::new().await;
    let pharmacist_id = Uuid::new_v4();

    let bad = app
        .as_pharmacist(
            pharmacist_id,
            Method::GET,
            "/api/v1/pharmacist/orders?status=teleported",
            None,
        )
        .await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(bad).await["code"], "validation_error");

    let good = app
        .as_pharmacist(
            pharmacist_id,
            Method::GET,
            "/api/v1/pharmacist/orders?status=pending",
            None,
        )
        .await;
    assert_eq!(good.status(), StatusCode::OK);
    assert_eq!(response_json(good).await["data"]["total"], 0);
}

#[tokio::test]
async fn health_reports_components() {
    let app = TestApp::new().await;

    let response = app
        .request(common::json_request(Method::GET, "/health", None, None))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["details"]["database"]["status"], "up");
}
