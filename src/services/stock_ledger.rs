use chrono::Utc;
use sea_orm::{sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::debug;
use uuid::Uuid;

use crate::entities::{pharmacy_product, product};
use crate::errors::ServiceError;

/// Stock of a pharmacy product as read back after a ledger write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub pharmacy_product_id: Uuid,
    pub product_name: String,
    pub stock: i32,
    pub sellable: bool,
}

impl StockLevel {
    pub fn is_negative(&self) -> bool {
        self.stock < 0
    }
}

/// Per pharmacy-product inventory counter.
///
/// Writes are plain `stock = stock +/- qty` updates on the caller's
/// connection. A decrement is not guarded, so the caller has to inspect the
/// returned level and roll its transaction back when it went negative.
#[derive(Debug, Clone, Default)]
pub struct StockLedger;

impl StockLedger {
    pub fn new() -> Self {
        Self
    }

    pub async fn decrement<C: ConnectionTrait>(
        &self,
        conn: &C,
        pharmacy_product_id: Uuid,
        quantity: i32,
    ) -> Result<StockLevel, ServiceError> {
        self.apply(conn, pharmacy_product_id, -quantity).await
    }

    pub async fn credit<C: ConnectionTrait>(
        &self,
        conn: &C,
        pharmacy_product_id: Uuid,
        quantity: i32,
    ) -> Result<StockLevel, ServiceError> {
        self.apply(conn, pharmacy_product_id, quantity).await
    }

    async fn apply<C: ConnectionTrait>(
        &self,
        conn: &C,
        pharmacy_product_id: Uuid,
        delta: i32,
    ) -> Result<StockLevel, ServiceError> {
        let result = pharmacy_product::Entity::update_many()
            .col_expr(
                pharmacy_product::Column::Stock,
                Expr::col(pharmacy_product::Column::Stock).add(delta),
            )
            .col_expr(pharmacy_product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(pharmacy_product::Column::Id.eq(pharmacy_product_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "pharmacy product {} not found",
                pharmacy_product_id
            )));
        }

        let level = self.level(conn, pharmacy_product_id).await?;
        debug!(
            %pharmacy_product_id,
            delta,
            stock = level.stock,
            "Stock ledger updated"
        );
        Ok(level)
    }

    pub async fn level<C: ConnectionTrait>(
        &self,
        conn: &C,
        pharmacy_product_id: Uuid,
    ) -> Result<StockLevel, ServiceError> {
        let (listing, catalog) = pharmacy_product::Entity::find_by_id(pharmacy_product_id)
            .find_also_related(product::Entity)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "pharmacy product {} not found",
                    pharmacy_product_id
                ))
            })?;

        Ok(StockLevel {
            pharmacy_product_id,
            product_name: catalog
                .map(|p| p.name)
                .unwrap_or_else(|| pharmacy_product_id.to_string()),
            stock: listing.stock,
            sellable: listing.is_sellable(),
        })
    }
}
