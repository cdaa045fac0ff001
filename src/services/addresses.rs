use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::user_address;
use crate::errors::ServiceError;

/// Source of a user's shipping address
#[async_trait]
pub trait AddressDirectory: Send + Sync {
    async fn active_address(
        &self,
        user_id: Uuid,
    ) -> Result<Option<user_address::Model>, ServiceError>;
}

pub struct DbAddressDirectory {
    db: Arc<DatabaseConnection>,
}

impl DbAddressDirectory {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AddressDirectory for DbAddressDirectory {
    async fn active_address(
        &self,
        user_id: Uuid,
    ) -> Result<Option<user_address::Model>, ServiceError> {
        Ok(user_address::Entity::find()
            .filter(user_address::Column::UserId.eq(user_id))
            .filter(user_address::Column::IsActive.eq(true))
            .order_by_desc(user_address::Column::CreatedAt)
            .one(&*self.db)
            .await?)
    }
}
