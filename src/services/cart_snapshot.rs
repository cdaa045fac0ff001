use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::cache::{get_json, set_json, CacheBackend};
use crate::errors::ServiceError;

/// A priced cart line frozen at snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SnapshotItem {
    pub cart_item_id: Uuid,
    pub pharmacy_product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    #[schema(value_type = String, example = "12500.00")]
    pub unit_price: Decimal,
    #[schema(value_type = String, example = "25000.00")]
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PharmacyGroup {
    pub pharmacy_id: Uuid,
    pub pharmacy_name: String,
    pub items: Vec<SnapshotItem>,
}

impl PharmacyGroup {
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(|i| i.subtotal).sum()
    }
}

/// Pharmacy-grouped selection handed from the cart to checkout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartSnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub groups: Vec<PharmacyGroup>,
    pub created_at: DateTime<Utc>,
}

impl CartSnapshot {
    pub fn new(user_id: Uuid, groups: Vec<PharmacyGroup>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            groups,
            created_at: Utc::now(),
        }
    }

    pub fn items_total(&self) -> Decimal {
        self.groups.iter().map(PharmacyGroup::subtotal).sum()
    }

    pub fn group(&self, pharmacy_id: Uuid) -> Option<&PharmacyGroup> {
        self.groups.iter().find(|g| g.pharmacy_id == pharmacy_id)
    }
}

/// Time-boxed storage of cart snapshots in the key-value cache
#[derive(Clone)]
pub struct CartSnapshotStore {
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl CartSnapshotStore {
    pub fn new(cache: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn key(user_id: Uuid, snapshot_id: Uuid) -> String {
        format!("checkout:{}:cartIds:{}", user_id, snapshot_id)
    }

    #[instrument(skip(self, snapshot), fields(snapshot_id = %snapshot.id))]
    pub async fn put(&self, user_id: Uuid, snapshot: &CartSnapshot) -> Result<Uuid, ServiceError> {
        set_json(
            self.cache.as_ref(),
            &Self::key(user_id, snapshot.id),
            snapshot,
            self.ttl,
        )
        .await?;
        debug!(ttl_secs = self.ttl.as_secs(), "Stored cart snapshot");
        Ok(snapshot.id)
    }

    /// A missing or expired snapshot is reported as [`ServiceError::CartUnavailable`].
    pub async fn get(&self, user_id: Uuid, snapshot_id: Uuid) -> Result<CartSnapshot, ServiceError> {
        get_json::<CartSnapshot>(self.cache.as_ref(), &Self::key(user_id, snapshot_id))
            .await?
            .ok_or(ServiceError::CartUnavailable)
    }

    pub async fn delete(&self, user_id: Uuid, snapshot_id: Uuid) -> Result<(), ServiceError> {
        self.cache
            .delete(&Self::key(user_id, snapshot_id))
            .await
            .map_err(Into::into)
    }
}
