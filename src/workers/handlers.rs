use async_trait::async_trait;

use crate::errors::ServiceError;
use crate::message_queue::Topic;
use crate::services::order_status::{OrderStatusService, TransitionOutcome};
use crate::services::scheduler::{PaymentConfirmationPayload, ShipmentCompletionPayload};

use super::StatusHandler;

/// Pending -> Processing once the simulated payment confirmation fires
pub struct PaymentConfirmationHandler {
    status: OrderStatusService,
}

impl PaymentConfirmationHandler {
    pub fn new(status: OrderStatusService) -> Self {
        Self { status }
    }
}

#[async_trait]
impl StatusHandler for PaymentConfirmationHandler {
    fn topic(&self) -> Topic {
        Topic::payment_confirmation()
    }

    async fn handle(&self, body: &[u8]) -> Result<TransitionOutcome, ServiceError> {
        let payload: PaymentConfirmationPayload = serde_json::from_slice(body)?;
        self.status.confirm_payment(&payload.order_detail_ids).await
    }
}

/// Shipped -> Delivered when the customer did not confirm in time
pub struct ShipmentCompletionHandler {
    status: OrderStatusService,
}

impl ShipmentCompletionHandler {
    pub fn new(status: OrderStatusService) -> Self {
        Self { status }
    }
}

#[async_trait]
impl StatusHandler for ShipmentCompletionHandler {
    fn topic(&self) -> Topic {
        Topic::shipment_completion()
    }

    async fn handle(&self, body: &[u8]) -> Result<TransitionOutcome, ServiceError> {
        let payload: ShipmentCompletionPayload = serde_json::from_slice(body)?;
        self.status.complete_delivery(payload.status_order).await
    }
}
