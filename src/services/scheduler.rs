use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::message_queue::{DelayedBroker, OutgoingMessage, Topic};

/// Body of a payment confirmation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmationPayload {
    pub order_detail_ids: Vec<Uuid>,
}

/// Body of a shipment auto-completion message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentCompletionPayload {
    pub status_order: Uuid,
}

/// Publishes delayed status messages. One message per logical event.
#[derive(Clone)]
pub struct DelayedStatusScheduler {
    broker: Arc<dyn DelayedBroker>,
}

impl DelayedStatusScheduler {
    pub fn new(broker: Arc<dyn DelayedBroker>) -> Self {
        Self { broker }
    }

    pub fn topics() -> [Topic; 2] {
        [Topic::payment_confirmation(), Topic::shipment_completion()]
    }

    /// Declare every topic this scheduler publishes to. Safe on every start.
    pub async fn init(&self) -> Result<(), ServiceError> {
        for topic in Self::topics() {
            self.broker.declare(&topic).await?;
        }
        info!("Delayed status scheduler ready");
        Ok(())
    }

    #[instrument(skip(self, payload), fields(exchange = %topic.exchange, delay_ms = delay.as_millis() as u64))]
    pub async fn schedule<T: Serialize>(
        &self,
        topic: &Topic,
        payload: &T,
        delay: Duration,
    ) -> Result<(), ServiceError> {
        let body = serde_json::to_vec(payload)?;
        self.broker
            .publish(topic, OutgoingMessage::new(body, delay))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to schedule delayed status message");
                counter!("pharmacy_orders.schedule_failures", 1, "queue" => topic.queue.clone());
                ServiceError::from(e)
            })?;

        counter!("pharmacy_orders.scheduled", 1, "queue" => topic.queue.clone());
        Ok(())
    }

    pub async fn schedule_payment_confirmation(
        &self,
        order_detail_ids: Vec<Uuid>,
        delay: Duration,
    ) -> Result<(), ServiceError> {
        self.schedule(
            &Topic::payment_confirmation(),
            &PaymentConfirmationPayload { order_detail_ids },
            delay,
        )
        .await
    }

    pub async fn schedule_shipment_completion(
        &self,
        order_detail_id: Uuid,
        delay: Duration,
    ) -> Result<(), ServiceError> {
        self.schedule(
            &Topic::shipment_completion(),
            &ShipmentCompletionPayload {
                status_order: order_detail_id,
            },
            delay,
        )
        .await
    }
}
