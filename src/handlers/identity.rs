//! Caller identity forwarded by the gateway in front of this service.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::errors::ServiceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const PHARMACIST_ID_HEADER: &str = "x-pharmacist-id";

fn header_uuid(parts: &Parts, name: &str) -> Result<Uuid, ServiceError> {
    let raw = parts
        .headers
        .get(name)
        .ok_or_else(|| ServiceError::Unauthorized(format!("missing {} header", name)))?;

    raw.to_str()
        .ok()
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or_else(|| ServiceError::Unauthorized(format!("malformed {} header", name)))
}

/// Authenticated customer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomerId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CustomerId
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_uuid(parts, USER_ID_HEADER).map(CustomerId)
    }
}

/// Authenticated pharmacist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PharmacistId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for PharmacistId
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_uuid(parts, PHARMACIST_ID_HEADER).map(PharmacistId)
    }
}
