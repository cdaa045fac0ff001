use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Domain events are informational; a closed channel must never fail
    /// the operation that produced them.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

// Events emitted by the order lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        total_price: Decimal,
        order_detail_ids: Vec<Uuid>,
    },
    PaymentProofUploaded {
        order_id: Uuid,
        order_detail_ids: Vec<Uuid>,
    },
    OrderStatusChanged {
        order_detail_ids: Vec<Uuid>,
        old_status: OrderStatus,
        new_status: OrderStatus,
        at: DateTime<Utc>,
    },
    OrderCancelled {
        order_id: Uuid,
        user_id: Uuid,
    },
    OrderDetailDeleted {
        order_detail_id: Uuid,
        pharmacist_id: Uuid,
        restocked_lines: usize,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "order_created",
            Event::PaymentProofUploaded { .. } => "payment_proof_uploaded",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::OrderCancelled { .. } => "order_cancelled",
            Event::OrderDetailDeleted { .. } => "order_detail_deleted",
        }
    }

    pub fn status_changed(ids: Vec<Uuid>, old_status: OrderStatus, new_status: OrderStatus) -> Self {
        Event::OrderStatusChanged {
            order_detail_ids: ids,
            old_status,
            new_status,
            at: Utc::now(),
        }
    }
}

/// Drains the event channel for the lifetime of the process.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("pharmacy_orders.events", 1, "event" => event.name());
        match &event {
            Event::OrderCreated {
                order_id,
                user_id,
                total_price,
                order_detail_ids,
            } => info!(
                %order_id,
                %user_id,
                %total_price,
                details = order_detail_ids.len(),
                "Order created"
            ),
            Event::OrderStatusChanged {
                order_detail_ids,
                old_status,
                new_status,
                ..
            } => info!(
                ?order_detail_ids,
                %old_status,
                %new_status,
                "Order detail status changed"
            ),
            other => info!(event = ?other, "Order event"),
        }
    }

    info!("Event channel closed, event processing stopped");
}
