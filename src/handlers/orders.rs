use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::OrderStatus;
use crate::errors::ServiceError;
use crate::handlers::identity::CustomerId;
use crate::services::checkout::{CheckoutReceipt, CheckoutRequest};
use crate::services::orders::OrderView;
use crate::services::payment_proof::ProofUpload;
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

/// Status of the order (details) after a customer action
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusChangeResponse {
    pub id: Uuid,
    pub status: OrderStatus,
}

fn multipart_error(err: MultipartError) -> ServiceError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge(err.body_text())
    } else {
        ServiceError::ValidationError(format!("invalid multipart body: {}", err.body_text()))
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Checkout",
    description = "Create an order from a cart snapshot and one delivery option per pharmacy",
    request_body = CheckoutRequest,
    params(("x-user-id" = String, Header, description = "Customer id")),
    responses(
        (status = 201, description = "Order created", body = ApiResponse<CheckoutReceipt>),
        (status = 400, description = "Invalid delivery data or no active address", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart snapshot expired", body = crate::errors::ErrorResponse),
        (status = 409, description = "Cart changed since the snapshot", body = crate::errors::ErrorResponse),
        (status = 422, description = "Products inactive or out of stock", body = crate::errors::ErrorResponse),
        (status = 503, description = "Temporarily unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    CustomerId(user_id): CustomerId,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutReceipt>>), ServiceError> {
    let receipt = state.services.checkout.checkout(user_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(receipt))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List own orders",
    params(
        ("x-user-id" = String, Header, description = "Customer id"),
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
    ),
    responses(
        (status = 200, description = "Orders, newest first", body = ApiResponse<PaginatedResponse<OrderView>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    CustomerId(user_id): CustomerId,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderView>>>, ServiceError> {
    let page = state
        .services
        .orders
        .list_for_user(user_id, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::from(page))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get own order",
    params(
        ("x-user-id" = String, Header, description = "Customer id"),
        ("id" = Uuid, Path, description = "Order id"),
    ),
    responses(
        (status = 200, description = "Order with its details and line items", body = ApiResponse<OrderView>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    CustomerId(user_id): CustomerId,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderView>>, ServiceError> {
    let order = state.services.orders.get_for_user(user_id, order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    summary = "Cancel order",
    description = "Cancel every order detail; only legal while pending or processing",
    params(
        ("x-user-id" = String, Header, description = "Customer id"),
        ("id" = Uuid, Path, description = "Order id"),
    ),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<StatusChangeResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order can no longer be cancelled", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    CustomerId(user_id): CustomerId,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<StatusChangeResponse>>, ServiceError> {
    state
        .services
        .cancellation
        .cancel_by_user(user_id, order_id)
        .await?;
    Ok(Json(ApiResponse::success(StatusChangeResponse {
        id: order_id,
        status: OrderStatus::Cancelled,
    })))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payment-proof",
    summary = "Upload payment proof",
    description = "Multipart upload (field `file`, jpeg/png/pdf). Payment is confirmed after a delay.",
    params(
        ("x-user-id" = String, Header, description = "Customer id"),
        ("id" = Uuid, Path, description = "Order id"),
    ),
    responses(
        (status = 202, description = "Proof stored, confirmation scheduled", body = ApiResponse<StatusChangeResponse>),
        (status = 400, description = "Missing or unsupported file", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is no longer pending", body = crate::errors::ErrorResponse),
        (status = 413, description = "File too large", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn upload_payment_proof(
    State(state): State<AppState>,
    CustomerId(user_id): CustomerId,
    Path(order_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<StatusChangeResponse>>), ServiceError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        debug!(%content_type, bytes = bytes.len(), "Received payment proof");
        upload = Some(ProofUpload::new(content_type, bytes.to_vec()));
    }

    let upload = upload
        .ok_or_else(|| ServiceError::ValidationError("multipart field 'file' is required".into()))?;

    state
        .services
        .order_status
        .upload_payment_proof(user_id, order_id, upload)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(StatusChangeResponse {
            id: order_id,
            status: OrderStatus::Pending,
        })),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/order-details/{id}/confirm-delivery",
    summary = "Confirm delivery",
    params(
        ("x-user-id" = String, Header, description = "Customer id"),
        ("id" = Uuid, Path, description = "Order detail id"),
    ),
    responses(
        (status = 200, description = "Order detail delivered", body = ApiResponse<StatusChangeResponse>),
        (status = 404, description = "Order detail not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order detail is not shipped", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn confirm_delivery(
    State(state): State<AppState>,
    CustomerId(user_id): CustomerId,
    Path(order_detail_id): Path<Uuid>,
) -> Result<Json<ApiResponse<StatusChangeResponse>>, ServiceError> {
    state
        .services
        .order_status
        .confirm_delivery(user_id, order_detail_id)
        .await?;
    Ok(Json(ApiResponse::success(StatusChangeResponse {
        id: order_detail_id,
        status: OrderStatus::Delivered,
    })))
}
