use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A line in a customer's cart
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cart_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub pharmacy_product_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pharmacy_product::Entity",
        from = "Column::PharmacyProductId",
        to = "super::pharmacy_product::Column::Id"
    )]
    PharmacyProduct,
}

impl Related<super::pharmacy_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PharmacyProduct.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
