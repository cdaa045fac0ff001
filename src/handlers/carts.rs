use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::handlers::identity::CustomerId;
use crate::services::cart_snapshot::CartSnapshot;
use crate::{ApiResponse, AppState};

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct PrepareCheckoutRequest {
    #[validate(length(min = 1, max = 200, message = "select between 1 and 200 cart items"))]
    pub cart_item_ids: Vec<Uuid>,
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/checkout",
    summary = "Prepare checkout",
    description = "Freeze the selected cart lines into a priced snapshot grouped by pharmacy. The snapshot expires after a few minutes.",
    request_body = PrepareCheckoutRequest,
    params(("x-user-id" = String, Header, description = "Customer id")),
    responses(
        (status = 201, description = "Snapshot created", body = ApiResponse<CartSnapshot>),
        (status = 400, description = "Empty selection", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown cart item", body = crate::errors::ErrorResponse),
    ),
    tag = "cart"
)]
pub async fn prepare_checkout(
    State(state): State<AppState>,
    CustomerId(user_id): CustomerId,
    Json(request): Json<PrepareCheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CartSnapshot>>), ServiceError> {
    request.validate()?;
    let snapshot = state
        .services
        .cart
        .prepare_checkout(user_id, &request.cart_item_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(snapshot))))
}
