use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::OrderStatus;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::OrderRepository;
use crate::services::order_status::owned_detail;
use crate::services::rollback;
use crate::services::stock_ledger::StockLedger;

/// Early termination of orders by their customer or pharmacist
#[derive(Clone)]
pub struct CancellationService {
    db: Arc<DatabaseConnection>,
    orders: OrderRepository,
    ledger: StockLedger,
    event_sender: Arc<EventSender>,
}

impl CancellationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self {
            orders: OrderRepository::new(db.clone()),
            ledger: StockLedger::new(),
            db,
            event_sender,
        }
    }

    /// Cancels every live order detail of the customer's order. All of them
    /// must still be pending or processing, otherwise nothing changes.
    #[instrument(skip(self))]
    pub async fn cancel_by_user(&self, user_id: Uuid, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let ids = match self.cancel_order_details(&txn, user_id, order_id).await {
            Ok(ids) => ids,
            Err(e) => {
                rollback(txn).await;
                return Err(e);
            }
        };
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCancelled { order_id, user_id })
            .await;
        info!(%order_id, details = ids.len(), "Order cancelled by customer");
        Ok(())
    }

    async fn cancel_order_details(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<Uuid>, ServiceError> {
        self.orders
            .find_order_for_user(txn, order_id, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;

        let details = self.orders.live_details(txn, order_id).await?;
        if details.is_empty() {
            return Err(ServiceError::InvalidStatus(
                "order has no open order details".to_string(),
            ));
        }
        if let Some(d) = details.iter().find(|d| !d.status.is_cancellable()) {
            return Err(ServiceError::InvalidStatus(format!(
                "order detail {} is {} and can no longer be cancelled",
                d.id, d.status
            )));
        }

        let ids: Vec<Uuid> = details.iter().map(|d| d.id).collect();
        let moved = self
            .orders
            .transition_from_any(
                txn,
                &ids,
                &OrderStatus::cancellable(),
                OrderStatus::Cancelled,
            )
            .await?;

        // A detail advanced between the read and the update
        if moved != ids.len() as u64 {
            return Err(ServiceError::InvalidStatus(
                "order status changed while cancelling, please retry".to_string(),
            ));
        }
        Ok(ids)
    }

    /// Cancels one order detail of the pharmacist's pharmacy, puts its stock
    /// back and soft-deletes it with its line items.
    #[instrument(skip(self))]
    pub async fn delete_order(
        &self,
        pharmacist_id: Uuid,
        order_detail_id: Uuid,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let restocked = match self
            .cancel_and_restock(&txn, pharmacist_id, order_detail_id)
            .await
        {
            Ok(restocked) => restocked,
            Err(e) => {
                rollback(txn).await;
                return Err(e);
            }
        };
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderDetailDeleted {
                order_detail_id,
                pharmacist_id,
                restocked_lines: restocked,
            })
            .await;
        info!(%order_detail_id, restocked, "Order detail deleted by pharmacist");
        Ok(())
    }

    async fn cancel_and_restock(
        &self,
        txn: &DatabaseTransaction,
        pharmacist_id: Uuid,
        order_detail_id: Uuid,
    ) -> Result<usize, ServiceError> {
        let detail = owned_detail(&self.orders, txn, pharmacist_id, order_detail_id).await?;

        let moved = self
            .orders
            .transition_from_any(
                txn,
                &[order_detail_id],
                &OrderStatus::cancellable(),
                OrderStatus::Cancelled,
            )
            .await?;
        if moved == 0 {
            return Err(ServiceError::InvalidStatus(format!(
                "order detail is {} and can no longer be cancelled",
                detail.status
            )));
        }

        let lines = self.orders.line_items(txn, order_detail_id).await?;
        for line in &lines {
            self.ledger
                .credit(txn, line.pharmacy_product_id, line.quantity)
                .await?;
        }

        self.orders.soft_delete_detail(txn, order_detail_id).await?;
        Ok(lines.len())
    }
}
