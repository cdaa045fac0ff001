use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Line item of an order detail, priced at purchase time
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_product_details")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_detail_id: Uuid,
    pub pharmacy_product_id: Uuid,
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order_detail::Entity",
        from = "Column::OrderDetailId",
        to = "super::order_detail::Column::Id"
    )]
    OrderDetail,
    #[sea_orm(
        belongs_to = "super::pharmacy_product::Entity",
        from = "Column::PharmacyProductId",
        to = "super::pharmacy_product::Column::Id"
    )]
    PharmacyProduct,
}

impl Related<super::order_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderDetail.def()
    }
}

impl Related<super::pharmacy_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PharmacyProduct.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn subtotal(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}
