use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::entities::OrderStatus;
use crate::errors::ServiceError;
use crate::handlers::identity::PharmacistId;
use crate::handlers::orders::StatusChangeResponse;
use crate::services::orders::OrderDetailView;
use crate::{ApiResponse, AppState, PaginatedResponse};

#[derive(Debug, Deserialize, IntoParams)]
pub struct PharmacistOrderQuery {
    /// pending, processing, shipped, delivered or cancelled
    pub status: Option<String>,
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

impl PharmacistOrderQuery {
    fn status(&self) -> Result<Option<OrderStatus>, ServiceError> {
        self.status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().parse::<OrderStatus>())
            .transpose()
            .map_err(ServiceError::ValidationError)
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/pharmacist/orders",
    summary = "List pharmacy orders",
    params(
        ("x-pharmacist-id" = String, Header, description = "Pharmacist id"),
        PharmacistOrderQuery,
    ),
    responses(
        (status = 200, description = "Order details of the pharmacist's pharmacies", body = ApiResponse<PaginatedResponse<OrderDetailView>>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
    ),
    tag = "pharmacist"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    PharmacistId(pharmacist_id): PharmacistId,
    Query(query): Query<PharmacistOrderQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderDetailView>>>, ServiceError> {
    let status = query.status()?;
    let page = state
        .services
        .orders
        .list_for_pharmacist(pharmacist_id, status, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::from(page))))
}

#[utoipa::path(
    get,
    path = "/api/v1/pharmacist/orders/{id}",
    summary = "Get pharmacy order detail",
    params(
        ("x-pharmacist-id" = String, Header, description = "Pharmacist id"),
        ("id" = Uuid, Path, description = "Order detail id"),
    ),
    responses(
        (status = 200, description = "Order detail with line items", body = ApiResponse<OrderDetailView>),
        (status = 403, description = "Belongs to another pharmacy", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order detail not found", body = crate::errors::ErrorResponse),
    ),
    tag = "pharmacist"
)]
pub async fn get_order(
    State(state): State<AppState>,
    PharmacistId(pharmacist_id): PharmacistId,
    Path(order_detail_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderDetailView>>, ServiceError> {
    let detail = state
        .services
        .orders
        .get_for_pharmacist(pharmacist_id, order_detail_id)
        .await?;
    Ok(Json(ApiResponse::success(detail)))
}

#[utoipa::path(
    post,
    path = "/api/v1/pharmacist/orders/{id}/ship",
    summary = "Ship order detail",
    description = "Processing -> Shipped. Delivery completes automatically if the customer does not confirm.",
    params(
        ("x-pharmacist-id" = String, Header, description = "Pharmacist id"),
        ("id" = Uuid, Path, description = "Order detail id"),
    ),
    responses(
        (status = 200, description = "Shipped", body = ApiResponse<StatusChangeResponse>),
        (status = 403, description = "Belongs to another pharmacy", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order detail is not processing", body = crate::errors::ErrorResponse),
        (status = 503, description = "Scheduling failed, nothing changed", body = crate::errors::ErrorResponse),
    ),
    tag = "pharmacist"
)]
pub async fn ship_order(
    State(state): State<AppState>,
    PharmacistId(pharmacist_id): PharmacistId,
    Path(order_detail_id): Path<Uuid>,
) -> Result<Json<ApiResponse<StatusChangeResponse>>, ServiceError> {
    state
        .services
        .order_status
        .ship(pharmacist_id, order_detail_id)
        .await?;
    Ok(Json(ApiResponse::success(StatusChangeResponse {
        id: order_detail_id,
        status: OrderStatus::Shipped,
    })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/pharmacist/orders/{id}",
    summary = "Delete order detail",
    description = "Cancel a pending or processing order detail, restock its products and hide it",
    params(
        ("x-pharmacist-id" = String, Header, description = "Pharmacist id"),
        ("id" = Uuid, Path, description = "Order detail id"),
    ),
    responses(
        (status = 200, description = "Deleted", body = ApiResponse<StatusChangeResponse>),
        (status = 403, description = "Belongs to another pharmacy", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order detail can no longer be cancelled", body = crate::errors::ErrorResponse),
    ),
    tag = "pharmacist"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    PharmacistId(pharmacist_id): PharmacistId,
    Path(order_detail_id): Path<Uuid>,
) -> Result<Json<ApiResponse<StatusChangeResponse>>, ServiceError> {
    state
        .services
        .cancellation
        .delete_order(pharmacist_id, order_detail_id)
        .await?;
    Ok(Json(ApiResponse::success(StatusChangeResponse {
        id: order_detail_id,
        status: OrderStatus::Cancelled,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn query(status: Option<&str>) -> PharmacistOrderQuery {
        PharmacistOrderQuery {
            status: status.map(str::to_string),
            page: 1,
            limit: 20,
        }
    }

    #[test]
    fn parses_status_filter() {
        assert_eq!(query(Some("Shipped")).status().unwrap(), Some(OrderStatus::Shipped));
        assert_eq!(query(Some("")).status().unwrap(), None);
        assert_eq!(query(None).status().unwrap(), None);
        assert_matches!(
            query(Some("lost")).status(),
            Err(ServiceError::ValidationError(_))
        );
    }
}
