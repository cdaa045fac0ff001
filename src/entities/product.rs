use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog product shared by every pharmacy that stocks it
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::pharmacy_product::Entity")]
    PharmacyProducts,
}

impl Related<super::pharmacy_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PharmacyProducts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
