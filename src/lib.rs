//! Pharmacy order API
//!
//! Order lifecycle of a multi-vendor pharmacy marketplace: cart snapshots,
//! transactional checkout with stock decrement, delayed status transitions
//! driven by a message broker, and cancellation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod message_queue;
pub mod migrator;
pub mod openapi;
pub mod repositories;
pub mod services;
pub mod workers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{IntoParams, ToSchema};

/// Multipart framing on top of the proof file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub cache: Arc<dyn cache::CacheBackend>,
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> From<services::orders::Page<T>> for PaginatedResponse<T> {
    fn from(page: services::orders::Page<T>) -> Self {
        let total_pages = page.total_pages();
        Self {
            items: page.items,
            total: page.total,
            page: page.page,
            limit: page.limit,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Customer and pharmacist routes, mounted under `/api/v1`
pub fn api_v1_routes(config: &config::AppConfig) -> Router<AppState> {
    let upload_limit = config
        .max_payment_proof_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let customer = Router::new()
        .route("/cart/checkout", post(handlers::carts::prepare_checkout))
        .route(
            "/orders",
            post(handlers::orders::checkout).get(handlers::orders::list_orders),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        .route(
            "/orders/:id/payment-proof",
            post(handlers::orders::upload_payment_proof)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/order-details/:id/confirm-delivery",
            post(handlers::orders::confirm_delivery),
        );

    let pharmacist = Router::new()
        .route("/orders", get(handlers::pharmacist::list_orders))
        .route(
            "/orders/:id",
            get(handlers::pharmacist::get_order).delete(handlers::pharmacist::delete_order),
        )
        .route("/orders/:id/ship", post(handlers::pharmacist::ship_order));

    Router::new()
        .merge(customer)
        .nest("/pharmacist", pharmacist)
}

/// Full application router with health, API, docs and HTTP middleware
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .merge(handlers::health::health_routes())
        .nest("/api/v1", api_v1_routes(&state.config))
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
