use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

/// Error body returned for every failed request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Unprocessable Entity",
    "message": "Some products are unavailable",
    "code": "products_unavailable",
    "details": {
        "inactive_products": ["Paracetamol 500mg"],
        "out_of_stock_products": []
    },
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    #[schema(example = "Bad Request")]
    pub error: String,
    /// Human-readable error description
    #[schema(example = "invalid delivery data")]
    pub message: String,
    /// Machine-readable error code
    #[schema(example = "invalid_delivery_data")]
    pub code: String,
    /// Request field the error refers to, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "deliveries")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("invalid delivery data: {0}")]
    InvalidDeliveryData(String),

    #[error("no active shipping address")]
    NoActiveAddress,

    #[error("cart not available, please re-select")]
    CartUnavailable,

    #[error("cart item not exists: {0}")]
    CartItemMissing(uuid::Uuid),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Some products are unavailable")]
    ProductsUnavailable {
        inactive: Vec<String>,
        out_of_stock: Vec<String>,
    },

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<crate::cache::CacheError> for ServiceError {
    fn from(err: crate::cache::CacheError) -> Self {
        ServiceError::CacheError(err.to_string())
    }
}

impl From<crate::message_queue::BrokerError> for ServiceError {
    fn from(err: crate::message_queue::BrokerError) -> Self {
        ServiceError::QueueError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) | Self::InvalidDeliveryData(_) | Self::NoActiveAddress => {
                StatusCode::BAD_REQUEST
            }
            Self::CartUnavailable | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::CartItemMissing(_) | Self::InvalidStatus(_) => StatusCode::CONFLICT,
            Self::ProductsUnavailable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::DatabaseError(_) | Self::CacheError(_) | Self::QueueError(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::StorageError(_) | Self::SerializationError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable code paired with the message in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "validation_error",
            Self::InvalidDeliveryData(_) => "invalid_delivery_data",
            Self::NoActiveAddress => "no_active_address",
            Self::CartUnavailable => "cart_not_available",
            Self::CartItemMissing(_) => "cart_item_not_found",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidStatus(_) => "invalid_status",
            Self::ProductsUnavailable { .. } => "products_unavailable",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::DatabaseError(_) | Self::CacheError(_) | Self::QueueError(_) => {
                "temporarily_unavailable"
            }
            Self::StorageError(_) | Self::SerializationError(_) | Self::InternalError(_) => {
                "internal_error"
            }
        }
    }

    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidDeliveryData(_) => Some("deliveries"),
            Self::NoActiveAddress => Some("address"),
            Self::CartUnavailable => Some("snapshot_id"),
            Self::CartItemMissing(_) => Some("cart_item_ids"),
            Self::PayloadTooLarge(_) => Some("file"),
            _ => None,
        }
    }

    /// Infrastructure failures that may succeed when attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_) | Self::CacheError(_) | Self::QueueError(_)
        )
    }

    /// Returns the error message suitable for HTTP responses.
    /// Infrastructure errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::CacheError(_) | Self::QueueError(_) => {
                "Service temporarily unavailable, please retry".to_string()
            }
            Self::StorageError(_) | Self::SerializationError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::ProductsUnavailable {
                inactive,
                out_of_stock,
            } => Some(json!({
                "inactive_products": inactive,
                "out_of_stock_products": out_of_stock,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            code: self.code().to_string(),
            field: self.field().map(str::to_string),
            details: self.details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
