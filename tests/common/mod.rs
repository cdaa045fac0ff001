#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use pharmacy_order_api::{
    cache::{CacheBackend, InMemoryCache},
    config::AppConfig,
    db,
    entities::{
        cart_item, order, order_detail, order_product_detail, pharmacy, pharmacy_product,
        product, user_address, OrderStatus,
    },
    events::{self, EventSender},
    handlers::{
        identity::{PHARMACIST_ID_HEADER, USER_ID_HEADER},
        AppServices,
    },
    message_queue::InMemoryBroker,
    services::delivery_quotes::DeliveryQuote,
    workers, AppState,
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tower::ServiceExt;
use uuid::Uuid;

pub const POSTAL_CODE: &str = "40115";

/// Application state over an in-memory SQLite database, cache and broker.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub config: AppConfig,
    pub broker: InMemoryBroker,
    shutdown: watch::Sender<bool>,
    _proof_dir: TempDir,
    _event_task: JoinHandle<()>,
}

impl TestApp {
    /// Short delays so delayed transitions land within a test.
    pub async fn new() -> Self {
        Self::with_delays(Duration::from_millis(50), Duration::from_millis(50)).await
    }

    pub async fn with_delays(payment_confirmation: Duration, shipment_completion: Duration) -> Self {
        let proof_dir = tempfile::tempdir().expect("temp dir for payment proofs");

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "redis://127.0.0.1:6379".to_string(),
            "amqp://127.0.0.1:5672/%2f".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection keeps every query on the same in-memory database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_confirmation_delay_ms = payment_confirmation.as_millis() as u64;
        cfg.shipment_completion_delay_ms = shipment_completion.as_millis() as u64;
        cfg.consumer_retry_base_delay_ms = 10;
        cfg.consumer_prefetch = 4;
        cfg.payment_proof_dir = proof_dir.path().to_string_lossy().into_owned();
        cfg.max_payment_proof_bytes = 4096;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let cache: Arc<dyn CacheBackend> = Arc::new(InMemoryCache::new());
        let broker = InMemoryBroker::new();

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(
            db.clone(),
            &cfg,
            cache.clone(),
            Arc::new(broker.clone()),
            Arc::new(EventSender::new(event_tx)),
        );
        services
            .scheduler
            .init()
            .await
            .expect("declare delayed topics");

        let state = AppState {
            db,
            config: cfg.clone(),
            services,
            cache,
        };
        let (shutdown, _) = watch::channel(false);

        Self {
            router: pharmacy_order_api::app_router(state.clone()),
            state,
            config: cfg,
            broker,
            shutdown,
            _proof_dir: proof_dir,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    /// Starts the payment confirmation and shipment completion consumers.
    pub fn start_consumers(&self) -> Vec<JoinHandle<()>> {
        workers::status_consumers(
            &self.state.services.order_status,
            Arc::new(self.broker.clone()),
            &self.config,
        )
        .into_iter()
        .map(|consumer| consumer.spawn(self.shutdown.subscribe()))
        .collect()
    }

    pub fn stop_consumers(&self) {
        let _ = self.shutdown.send(true);
    }

    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn as_customer(
        &self,
        user_id: Uuid,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(json_request(method, uri, Some((USER_ID_HEADER, user_id)), body))
            .await
    }

    pub async fn as_pharmacist(
        &self,
        pharmacist_id: Uuid,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(json_request(
            method,
            uri,
            Some((PHARMACIST_ID_HEADER, pharmacist_id)),
            body,
        ))
        .await
    }

    // ----- seeding -----

    pub async fn seed_pharmacy(&self, pharmacist_id: Uuid, name: &str) -> pharmacy::Model {
        pharmacy::ActiveModel {
            id: Set(Uuid::new_v4()),
            pharmacist_id: Set(pharmacist_id),
            name: Set(name.to_string()),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("insert pharmacy")
    }

    /// Catalog product plus an active listing of it in `pharmacy_id`
    pub async fn seed_listing(
        &self,
        pharmacy_id: Uuid,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> pharmacy_product::Model {
        let now = Utc::now();
        let catalog = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            created_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("insert product");

        pharmacy_product::ActiveModel {
            id: Set(Uuid::new_v4()),
            pharmacy_id: Set(pharmacy_id),
            product_id: Set(catalog.id),
            price: Set(price),
            stock: Set(stock),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(self.db())
        .await
        .expect("insert pharmacy product")
    }

    pub async fn deactivate_listing(&self, listing_id: Uuid) {
        let listing = self.listing(listing_id).await;
        let mut active: pharmacy_product::ActiveModel = listing.into();
        active.is_active = Set(false);
        active.update(self.db()).await.expect("deactivate listing");
    }

    pub async fn seed_cart_item(
        &self,
        user_id: Uuid,
        pharmacy_product_id: Uuid,
        quantity: i32,
    ) -> cart_item::Model {
        let now = Utc::now();
        cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            pharmacy_product_id: Set(pharmacy_product_id),
            quantity: Set(quantity),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("insert cart item")
    }

    pub async fn seed_address(&self, user_id: Uuid) -> user_address::Model {
        user_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            recipient_name: Set("Test Customer".to_string()),
            address_line: Set("Jl. Asia Afrika 8".to_string()),
            city: Set("Bandung".to_string()),
            postal_code: Set(POSTAL_CODE.to_string()),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("insert address")
    }

    pub async fn seed_quote(&self, user_id: Uuid, pharmacy_id: Uuid, option_id: &str, fee: Decimal) {
        let mut quotes = self
            .state
            .services
            .quotes
            .get(user_id, pharmacy_id, POSTAL_CODE)
            .await
            .expect("read quotes");
        quotes.push(DeliveryQuote {
            option_id: option_id.to_string(),
            name: option_id.to_uppercase(),
            fee,
            eta: "1-2 days".to_string(),
        });
        self.state
            .services
            .quotes
            .put(user_id, pharmacy_id, POSTAL_CODE, &quotes)
            .await
            .expect("cache quotes");
    }

    // ----- reads -----

    pub async fn listing(&self, id: Uuid) -> pharmacy_product::Model {
        pharmacy_product::Entity::find_by_id(id)
            .one(self.db())
            .await
            .expect("query listing")
            .expect("listing exists")
    }

    pub async fn stock(&self, id: Uuid) -> i32 {
        self.listing(id).await.stock
    }

    pub async fn detail(&self, id: Uuid) -> order_detail::Model {
        order_detail::Entity::find_by_id(id)
            .one(self.db())
            .await
            .expect("query order detail")
            .expect("order detail exists")
    }

    pub async fn detail_status(&self, id: Uuid) -> OrderStatus {
        self.detail(id).await.status
    }

    pub async fn cart_item_exists(&self, id: Uuid) -> bool {
        cart_item::Entity::find_by_id(id)
            .one(self.db())
            .await
            .expect("query cart item")
            .is_some()
    }

    pub async fn order_count(&self) -> u64 {
        order::Entity::find()
            .count(self.db())
            .await
            .expect("count orders")
    }

    pub async fn detail_count(&self) -> u64 {
        order_detail::Entity::find()
            .count(self.db())
            .await
            .expect("count order details")
    }

    pub async fn line_item_count(&self) -> u64 {
        order_product_detail::Entity::find()
            .count(self.db())
            .await
            .expect("count line items")
    }

    pub async fn line_items(&self, order_detail_id: Uuid) -> Vec<order_product_detail::Model> {
        order_product_detail::Entity::find()
            .filter(order_product_detail::Column::OrderDetailId.eq(order_detail_id))
            .all(self.db())
            .await
            .expect("query line items")
    }
}

pub fn json_request(
    method: Method,
    uri: &str,
    identity: Option<(&str, Uuid)>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((name, id)) = identity {
        builder = builder.header(name, id.to_string());
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub fn multipart_request(
    uri: &str,
    user_id: Uuid,
    content_type: &str,
    bytes: &[u8],
) -> Request<Body> {
    const BOUNDARY: &str = "proof-boundary-7MA4YWxk";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"proof\"\r\n",
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(USER_ID_HEADER, user_id.to_string())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .expect("multipart request")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Polls `check` until it holds or `within` elapses.
pub async fn eventually<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
