use metrics::counter;
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{order_detail, OrderStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::OrderRepository;
use crate::services::payment_proof::{ProofStorage, ProofUpload};
use crate::services::rollback;
use crate::services::scheduler::DelayedStatusScheduler;

/// Result of a transition requested by a delayed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Rows moved to the target status
    Applied(u64),
    /// No row held the required predecessor; nothing changed
    Skipped,
}

impl TransitionOutcome {
    fn from_rows(rows: u64) -> Self {
        if rows == 0 {
            TransitionOutcome::Skipped
        } else {
            TransitionOutcome::Applied(rows)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatusDelays {
    pub payment_confirmation: Duration,
    pub shipment_completion: Duration,
}

/// Drives order details through Pending -> Processing -> Shipped -> Delivered
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    orders: OrderRepository,
    scheduler: DelayedStatusScheduler,
    proofs: Arc<dyn ProofStorage>,
    event_sender: Arc<EventSender>,
    delays: StatusDelays,
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        scheduler: DelayedStatusScheduler,
        proofs: Arc<dyn ProofStorage>,
        event_sender: Arc<EventSender>,
        delays: StatusDelays,
    ) -> Self {
        Self {
            orders: OrderRepository::new(db.clone()),
            db,
            scheduler,
            proofs,
            event_sender,
            delays,
        }
    }

    /// Conditional move to `to` from its single forward predecessor
    async fn advance<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[Uuid],
        to: OrderStatus,
    ) -> Result<u64, ServiceError> {
        let from = to.required_predecessor().ok_or_else(|| {
            ServiceError::InternalError(format!("{} has no forward predecessor", to))
        })?;
        let rows = self.orders.transition(conn, ids, from, to).await?;

        let outcome = if rows == 0 { "skipped" } else { "applied" };
        counter!("pharmacy_orders.transitions", 1, "to" => to.as_str(), "outcome" => outcome);
        Ok(rows)
    }

    async fn announce(&self, ids: Vec<Uuid>, to: OrderStatus) {
        if let Some(from) = to.required_predecessor() {
            self.event_sender
                .send_or_log(Event::status_changed(ids, from, to))
                .await;
        }
    }

    /// Stores the proof and schedules the simulated payment confirmation.
    /// The proof path is committed only once the message is accepted.
    #[instrument(skip(self, upload), fields(bytes = upload.bytes.len()))]
    pub async fn upload_payment_proof(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        upload: ProofUpload,
    ) -> Result<Vec<Uuid>, ServiceError> {
        self.proofs.check(&upload)?;

        let txn = self.db.begin().await?;
        match self.record_proof(&txn, user_id, order_id, &upload).await {
            Ok((ids, location)) => {
                if let Err(e) = txn.commit().await {
                    self.discard_proof(&location).await;
                    return Err(e.into());
                }
                self.event_sender
                    .send_or_log(Event::PaymentProofUploaded {
                        order_id,
                        order_detail_ids: ids.clone(),
                    })
                    .await;
                info!(%order_id, details = ids.len(), "Payment proof uploaded");
                Ok(ids)
            }
            Err(e) => {
                rollback(txn).await;
                Err(e)
            }
        }
    }

    async fn record_proof(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        order_id: Uuid,
        upload: &ProofUpload,
    ) -> Result<(Vec<Uuid>, String), ServiceError> {
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
        if let Some(d) = details.iter().find(|d| d.status != OrderStatus::Pending) {
            return Err(ServiceError::InvalidStatus(format!(
                "payment proof is only accepted while pending, order detail {} is {}",
                d.id, d.status
            )));
        }

        let ids: Vec<Uuid> = details.iter().map(|d| d.id).collect();
        let location = self.proofs.store(order_id, upload).await?;
        if let Err(e) = self.attach_proof(txn, order_id, &location, &ids).await {
            self.discard_proof(&location).await;
            return Err(e);
        }
        Ok((ids, location))
    }

    async fn attach_proof(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        location: &str,
        ids: &[Uuid],
    ) -> Result<(), ServiceError> {
        self.orders.set_payment_proof(txn, order_id, location).await?;
        self.scheduler
            .schedule_payment_confirmation(ids.to_vec(), self.delays.payment_confirmation)
            .await?;
        Ok(())
    }

    async fn discard_proof(&self, location: &str) {
        if let Err(e) = self.proofs.remove(location).await {
            warn!(%location, error = %e, "Failed to remove orphaned payment proof");
        }
    }

    /// Pending -> Processing, applied by the payment confirmation consumer
    #[instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        order_detail_ids: &[Uuid],
    ) -> Result<TransitionOutcome, ServiceError> {
        let rows = self
            .advance(&*self.db, order_detail_ids, OrderStatus::Processing)
            .await?;
        if rows > 0 {
            self.announce(order_detail_ids.to_vec(), OrderStatus::Processing)
                .await;
        }
        Ok(TransitionOutcome::from_rows(rows))
    }

    /// Processing -> Shipped by the pharmacist owning the order detail, then
    /// schedules automatic delivery completion.
    #[instrument(skip(self))]
    pub async fn ship(
        &self,
        pharmacist_id: Uuid,
        order_detail_id: Uuid,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        match self.mark_shipped(&txn, pharmacist_id, order_detail_id).await {
            Ok(()) => {
                txn.commit().await?;
                self.announce(vec![order_detail_id], OrderStatus::Shipped)
                    .await;
                info!(%order_detail_id, "Order detail shipped");
                Ok(())
            }
            Err(e) => {
                rollback(txn).await;
                Err(e)
            }
        }
    }

    async fn mark_shipped(
        &self,
        txn: &DatabaseTransaction,
        pharmacist_id: Uuid,
        order_detail_id: Uuid,
    ) -> Result<(), ServiceError> {
        let detail = owned_detail(&self.orders, txn, pharmacist_id, order_detail_id).await?;

        if self
            .advance(txn, &[order_detail_id], OrderStatus::Shipped)
            .await?
            == 0
        {
            return Err(ServiceError::InvalidStatus(format!(
                "order detail is {}, only processing orders can be shipped",
                detail.status
            )));
        }

        self.scheduler
            .schedule_shipment_completion(order_detail_id, self.delays.shipment_completion)
            .await
    }

    /// Shipped -> Delivered, applied by the shipment completion consumer
    #[instrument(skip(self))]
    pub async fn complete_delivery(
        &self,
        order_detail_id: Uuid,
    ) -> Result<TransitionOutcome, ServiceError> {
        let rows = self
            .advance(&*self.db, &[order_detail_id], OrderStatus::Delivered)
            .await?;
        if rows > 0 {
            self.announce(vec![order_detail_id], OrderStatus::Delivered)
                .await;
        }
        Ok(TransitionOutcome::from_rows(rows))
    }

    /// Shipped -> Delivered confirmed by the customer
    #[instrument(skip(self))]
    pub async fn confirm_delivery(
        &self,
        user_id: Uuid,
        order_detail_id: Uuid,
    ) -> Result<(), ServiceError> {
        let (detail, order) = self
            .orders
            .find_detail_with_order(&*self.db, order_detail_id)
            .await?
            .filter(|(_, order)| order.user_id == user_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("order detail {} not found", order_detail_id))
            })?;

        let rows = self
            .advance(&*self.db, &[detail.id], OrderStatus::Delivered)
            .await?;
        if rows == 0 {
            return Err(ServiceError::InvalidStatus(format!(
                "order detail is {}, only shipped orders can be confirmed",
                detail.status
            )));
        }

        self.announce(vec![detail.id], OrderStatus::Delivered).await;
        info!(order_id = %order.id, %order_detail_id, "Delivery confirmed by customer");
        Ok(())
    }
}

/// Locks the order detail and checks it belongs to one of the pharmacist's
/// pharmacies. Shared by the ship and delete paths.
pub(crate) async fn owned_detail(
    orders: &OrderRepository,
    txn: &DatabaseTransaction,
    pharmacist_id: Uuid,
    order_detail_id: Uuid,
) -> Result<order_detail::Model, ServiceError> {
    let detail = orders
        .lock_detail(txn, order_detail_id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("order detail {} not found", order_detail_id))
        })?;

    let pharmacy = orders
        .find_pharmacy(txn, detail.pharmacy_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("pharmacy {} not found", detail.pharmacy_id)))?;

    if pharmacy.pharmacist_id != pharmacist_id {
        return Err(ServiceError::Forbidden(
            "order detail belongs to another pharmacy".to_string(),
        ));
    }
    Ok(detail)
}
