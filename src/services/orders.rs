use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{order, order_detail, order_product_detail, OrderStatus};
use crate::errors::ServiceError;
use crate::repositories::OrderRepository;
use sea_orm::DatabaseConnection;

const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LineItemView {
    pub id: Uuid,
    pub pharmacy_product_id: Uuid,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub price: Decimal,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
}

impl From<order_product_detail::Model> for LineItemView {
    fn from(line: order_product_detail::Model) -> Self {
        Self {
            subtotal: line.subtotal(),
            id: line.id,
            pharmacy_product_id: line.pharmacy_product_id,
            quantity: line.quantity,
            price: line.price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetailView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub pharmacy_id: Uuid,
    pub status: OrderStatus,
    pub delivery_option: String,
    #[schema(value_type = String)]
    pub delivery_fee: Decimal,
    pub items: Vec<LineItemView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderDetailView {
    fn new(detail: order_detail::Model, items: Vec<order_product_detail::Model>) -> Self {
        Self {
            id: detail.id,
            order_id: detail.order_id,
            pharmacy_id: detail.pharmacy_id,
            status: detail.status,
            delivery_option: detail.delivery_option,
            delivery_fee: detail.delivery_fee,
            items: items.into_iter().map(LineItemView::from).collect(),
            created_at: detail.created_at,
            updated_at: detail.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(value_type = String)]
    pub total_price: Decimal,
    pub payment_proof: Option<String>,
    pub details: Vec<OrderDetailView>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            0
        } else {
            self.total.div_ceil(self.limit)
        }
    }
}

fn clamp(page: u64, limit: u64) -> (u64, u64) {
    (page.max(1), limit.clamp(1, MAX_PAGE_SIZE))
}

/// Read side of orders for customers and pharmacists
#[derive(Clone)]
pub struct OrderService {
    orders: OrderRepository,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            orders: OrderRepository::new(db),
        }
    }

    async fn detail_view(&self, detail: order_detail::Model) -> Result<OrderDetailView, ServiceError> {
        let items = self.orders.line_items(self.orders.db(), detail.id).await?;
        Ok(OrderDetailView::new(detail, items))
    }

    async fn order_view(&self, order: order::Model) -> Result<OrderView, ServiceError> {
        let details = self.orders.live_details(self.orders.db(), order.id).await?;
        let mut views = Vec::with_capacity(details.len());
        for detail in details {
            views.push(self.detail_view(detail).await?);
        }

        Ok(OrderView {
            id: order.id,
            user_id: order.user_id,
            total_price: order.total_price,
            payment_proof: order.payment_proof,
            details: views,
            created_at: order.created_at,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_for_user(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = self
            .orders
            .find_order_for_user(self.orders.db(), order_id, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;
        self.order_view(order).await
    }

    #[instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<Page<OrderView>, ServiceError> {
        let (page, limit) = clamp(page, limit);
        let (orders, total) = self.orders.list_for_user(user_id, page, limit).await?;

        let mut items = Vec::with_capacity(orders.len());
        for order in orders {
            items.push(self.order_view(order).await?);
        }
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_for_pharmacist(
        &self,
        pharmacist_id: Uuid,
        status: Option<OrderStatus>,
        page: u64,
        limit: u64,
    ) -> Result<Page<OrderDetailView>, ServiceError> {
        let (page, limit) = clamp(page, limit);
        let (details, total) = self
            .orders
            .list_for_pharmacist(pharmacist_id, status, page, limit)
            .await?;

        let mut items = Vec::with_capacity(details.len());
        for detail in details {
            items.push(self.detail_view(detail).await?);
        }
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    /// A single order detail of one of the pharmacist's pharmacies
    #[instrument(skip(self))]
    pub async fn get_for_pharmacist(
        &self,
        pharmacist_id: Uuid,
        order_detail_id: Uuid,
    ) -> Result<OrderDetailView, ServiceError> {
        let not_found =
            || ServiceError::NotFound(format!("order detail {} not found", order_detail_id));

        let (detail, _) = self
            .orders
            .find_detail_with_order(self.orders.db(), order_detail_id)
            .await?
            .ok_or_else(not_found)?;

        let pharmacy = self
            .orders
            .find_pharmacy(self.orders.db(), detail.pharmacy_id)
            .await?
            .ok_or_else(not_found)?;
        if pharmacy.pharmacist_id != pharmacist_id {
            return Err(ServiceError::Forbidden(
                "order detail belongs to another pharmacy".to_string(),
            ));
        }

        self.detail_view(detail).await
    }
}
