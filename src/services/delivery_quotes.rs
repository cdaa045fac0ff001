use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::cache::{get_json, set_json, CacheBackend};
use crate::errors::ServiceError;

/// One logistics option priced by the delivery-pricing collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryQuote {
    pub option_id: String,
    pub name: String,
    #[schema(value_type = String, example = "9000.00")]
    pub fee: Decimal,
    /// Free-form estimate such as "1-2 days"
    pub eta: String,
}

/// Quotes computed earlier for a user, pharmacy and destination. Checkout
/// reads them back, it never prices anything itself.
#[derive(Clone)]
pub struct DeliveryQuoteCache {
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl DeliveryQuoteCache {
    pub fn new(cache: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn key(user_id: Uuid, pharmacy_id: Uuid, postal_code: &str) -> String {
        format!("delivery:{}:{}:{}", user_id, pharmacy_id, postal_code)
    }

    pub async fn put(
        &self,
        user_id: Uuid,
        pharmacy_id: Uuid,
        postal_code: &str,
        quotes: &[DeliveryQuote],
    ) -> Result<(), ServiceError> {
        set_json(
            self.cache.as_ref(),
            &Self::key(user_id, pharmacy_id, postal_code),
            quotes,
            self.ttl,
        )
        .await
        .map_err(Into::into)
    }

    /// Cached quotes, or an empty list when none are cached
    pub async fn get(
        &self,
        user_id: Uuid,
        pharmacy_id: Uuid,
        postal_code: &str,
    ) -> Result<Vec<DeliveryQuote>, ServiceError> {
        Ok(get_json::<Vec<DeliveryQuote>>(
            self.cache.as_ref(),
            &Self::key(user_id, pharmacy_id, postal_code),
        )
        .await?
        .unwrap_or_default())
    }

    pub async fn find_option(
        &self,
        user_id: Uuid,
        pharmacy_id: Uuid,
        postal_code: &str,
        option_id: &str,
    ) -> Result<Option<DeliveryQuote>, ServiceError> {
        Ok(self
            .get(user_id, pharmacy_id, postal_code)
            .await?
            .into_iter()
            .find(|q| q.option_id == option_id))
    }
}
