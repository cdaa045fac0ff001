use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::entities::{
    order, order_detail, order_product_detail, pharmacy, OrderStatus,
};
use crate::errors::ServiceError;
use crate::repositories::Repository;

use super::BaseRepository;

/// One per-pharmacy sub-order to be written at checkout
#[derive(Debug, Clone)]
pub struct NewOrderDetail {
    pub id: Uuid,
    pub pharmacy_id: Uuid,
    pub delivery_fee: Decimal,
    pub delivery_option: String,
}

#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub pharmacy_product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
}

/// Storage for the Order / OrderDetail / OrderProductDetail aggregate.
///
/// Write methods take the connection explicitly so callers can run them inside
/// their own transaction. Status writes are conditional updates: they only
/// touch rows whose current status matches, and report how many rows moved.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }

    pub async fn insert_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        total_price: Decimal,
    ) -> Result<order::Model, ServiceError> {
        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            total_price: Set(total_price),
            payment_proof: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(order.insert(conn).await?)
    }

    /// Bulk insert of `Pending` order details. Returns their ids in input order.
    pub async fn insert_details<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        details: &[NewOrderDetail],
    ) -> Result<Vec<Uuid>, ServiceError> {
        if details.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let models = details.iter().map(|d| order_detail::ActiveModel {
            id: Set(d.id),
            order_id: Set(order_id),
            pharmacy_id: Set(d.pharmacy_id),
            delivery_fee: Set(d.delivery_fee),
            delivery_option: Set(d.delivery_option.clone()),
            status: Set(OrderStatus::Pending),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        });

        order_detail::Entity::insert_many(models)
            .exec_without_returning(conn)
            .await?;

        Ok(details.iter().map(|d| d.id).collect())
    }

    pub async fn insert_line_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_detail_id: Uuid,
        items: &[NewLineItem],
    ) -> Result<u64, ServiceError> {
        if items.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let models = items.iter().map(|item| order_product_detail::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_detail_id: Set(order_detail_id),
            pharmacy_product_id: Set(item.pharmacy_product_id),
            quantity: Set(item.quantity),
            price: Set(item.price),
            created_at: Set(now),
            deleted_at: Set(None),
        });

        Ok(order_product_detail::Entity::insert_many(models)
            .exec_without_returning(conn)
            .await?)
    }

    pub async fn find_order_for_user<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(order::Entity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(conn)
            .await?)
    }

    /// Order details that have not been soft-deleted
    pub async fn live_details<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<Vec<order_detail::Model>, ServiceError> {
        Ok(order_detail::Entity::find()
            .filter(order_detail::Column::OrderId.eq(order_id))
            .filter(order_detail::Column::DeletedAt.is_null())
            .order_by_asc(order_detail::Column::CreatedAt)
            .order_by_asc(order_detail::Column::Id)
            .all(conn)
            .await?)
    }

    pub async fn find_detail_with_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_detail_id: Uuid,
    ) -> Result<Option<(order_detail::Model, order::Model)>, ServiceError> {
        let found = order_detail::Entity::find_by_id(order_detail_id)
            .filter(order_detail::Column::DeletedAt.is_null())
            .find_also_related(order::Entity)
            .one(conn)
            .await?;

        Ok(found.and_then(|(detail, order)| order.map(|o| (detail, o))))
    }

    /// Reads a live order detail with an exclusive row lock for the rest of
    /// the surrounding transaction.
    pub async fn lock_detail<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_detail_id: Uuid,
    ) -> Result<Option<order_detail::Model>, ServiceError> {
        Ok(order_detail::Entity::find_by_id(order_detail_id)
            .filter(order_detail::Column::DeletedAt.is_null())
            .lock_exclusive()
            .one(conn)
            .await?)
    }

    pub async fn find_pharmacy<C: ConnectionTrait>(
        &self,
        conn: &C,
        pharmacy_id: Uuid,
    ) -> Result<Option<pharmacy::Model>, ServiceError> {
        Ok(pharmacy::Entity::find_by_id(pharmacy_id).one(conn).await?)
    }

    pub async fn line_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_detail_id: Uuid,
    ) -> Result<Vec<order_product_detail::Model>, ServiceError> {
        Ok(order_product_detail::Entity::find()
            .filter(order_product_detail::Column::OrderDetailId.eq(order_detail_id))
            .filter(order_product_detail::Column::DeletedAt.is_null())
            .all(conn)
            .await?)
    }

    /// `UPDATE order_details SET status = to WHERE id IN ids AND status = from`.
    /// Returns the number of rows that actually moved.
    pub async fn transition<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_detail_ids: &[Uuid],
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<u64, ServiceError> {
        self.transition_from_any(conn, order_detail_ids, &[from], to)
            .await
    }

    pub async fn transition_from_any<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_detail_ids: &[Uuid],
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<u64, ServiceError> {
        if order_detail_ids.is_empty() || from.is_empty() {
            return Ok(0);
        }

        let result = order_detail::Entity::update_many()
            .col_expr(order_detail::Column::Status, Expr::value(to))
            .col_expr(order_detail::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order_detail::Column::Id.is_in(order_detail_ids.iter().copied()))
            .filter(order_detail::Column::Status.is_in(from.iter().copied()))
            .filter(order_detail::Column::DeletedAt.is_null())
            .exec(conn)
            .await?;

        debug!(
            requested = order_detail_ids.len(),
            moved = result.rows_affected,
            %to,
            "Conditional status update"
        );
        Ok(result.rows_affected)
    }

    /// Marks the detail and its line items deleted without removing rows.
    pub async fn soft_delete_detail<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_detail_id: Uuid,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();

        order_product_detail::Entity::update_many()
            .col_expr(order_product_detail::Column::DeletedAt, Expr::value(now))
            .filter(order_product_detail::Column::OrderDetailId.eq(order_detail_id))
            .filter(order_product_detail::Column::DeletedAt.is_null())
            .exec(conn)
            .await?;

        order_detail::Entity::update_many()
            .col_expr(order_detail::Column::DeletedAt, Expr::value(now))
            .col_expr(order_detail::Column::UpdatedAt, Expr::value(now))
            .filter(order_detail::Column::Id.eq(order_detail_id))
            .exec(conn)
            .await?;

        Ok(())
    }

    pub async fn set_payment_proof<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        location: &str,
    ) -> Result<(), ServiceError> {
        order::Entity::update_many()
            .col_expr(order::Column::PaymentProof, Expr::value(location.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Customer's orders, newest first
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(self.db(), limit.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Order details of every pharmacy run by the pharmacist, newest first
    pub async fn list_for_pharmacist(
        &self,
        pharmacist_id: Uuid,
        status: Option<OrderStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<order_detail::Model>, u64), ServiceError> {
        let mut query = order_detail::Entity::find()
            .inner_join(pharmacy::Entity)
            .filter(pharmacy::Column::PharmacistId.eq(pharmacist_id))
            .filter(order_detail::Column::DeletedAt.is_null());

        if let Some(status) = status {
            query = query.filter(order_detail::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(order_detail::Column::CreatedAt)
            .paginate(self.db(), limit.max(1));

        let total = paginator.num_items().await?;
        let details = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((details, total))
    }
}
