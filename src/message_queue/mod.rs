/*!
 * # Delayed Message Broker
 *
 * Status transitions that must happen "later" (simulated payment
 * confirmation, automatic delivery completion) travel through a broker that
 * holds each message until its per-message delay elapses.
 *
 * Components receive a [`DelayedBroker`] at construction and declare the
 * exchange and queue they use themselves; declaring is idempotent.
 */

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod amqp;
pub mod in_memory;

pub use amqp::AmqpBroker;
pub use in_memory::InMemoryBroker;

/// Per-message delay header understood by the delayed-message exchange
pub const DELAY_HEADER: &str = "x-delay";
/// Number of earlier failed processing attempts of this message
pub const ATTEMPT_HEADER: &str = "x-attempt";
/// Reason recorded on dead-lettered messages
pub const DEAD_LETTER_REASON_HEADER: &str = "x-dead-letter-reason";

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Declare error: {0}")]
    Declare(String),
    #[error("Publish error: {0}")]
    Publish(String),
    #[error("Consume error: {0}")]
    Consume(String),
    #[error("Acknowledge error: {0}")]
    Ack(String),
}

/// Exchange and queue owned by one kind of delayed message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    pub exchange: String,
    pub queue: String,
}

impl Topic {
    pub fn new(exchange: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
        }
    }

    pub fn dead_letter_queue(&self) -> String {
        format!("{}.dead-letter", self.queue)
    }

    /// Pending -> Processing after a payment proof was uploaded
    pub fn payment_confirmation() -> Self {
        Self::new(
            "orders.payment-confirmation.delayed",
            "orders.payment-confirmation",
        )
    }

    /// Shipped -> Delivered when the customer never confirms receipt
    pub fn shipment_completion() -> Self {
        Self::new(
            "orders.shipment-completion.delayed",
            "orders.shipment-completion",
        )
    }
}

#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub body: Vec<u8>,
    pub delay: Duration,
    pub attempt: u32,
}

impl OutgoingMessage {
    pub fn new(body: Vec<u8>, delay: Duration) -> Self {
        Self {
            body,
            delay,
            attempt: 0,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

/// Settles one delivery with the broker
#[async_trait]
pub trait Acknowledger: Send {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;
    async fn requeue(self: Box<Self>) -> Result<(), BrokerError>;
}

/// A received message. It must be settled exactly once.
pub struct Delivery {
    pub body: Vec<u8>,
    pub attempt: u32,
    pub redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        body: Vec<u8>,
        attempt: u32,
        redelivered: bool,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            body,
            attempt,
            redelivered,
            acker,
        }
    }

    pub async fn ack(self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    /// Negative acknowledgement; the broker delivers the message again.
    pub async fn requeue(self) -> Result<(), BrokerError> {
        self.acker.requeue().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("bytes", &self.body.len())
            .field("attempt", &self.attempt)
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

#[async_trait]
pub trait DeliveryStream: Send {
    /// `None` once the underlying channel is closed.
    async fn next_delivery(&mut self) -> Option<Result<Delivery, BrokerError>>;
}

#[async_trait]
pub trait DelayedBroker: Send + Sync {
    /// Declares the delayed exchange, its bound queue and the dead-letter queue.
    async fn declare(&self, topic: &Topic) -> Result<(), BrokerError>;

    /// Returns once the broker has accepted the message.
    async fn publish(&self, topic: &Topic, message: OutgoingMessage) -> Result<(), BrokerError>;

    /// Parks a message that will not be processed again automatically.
    async fn dead_letter(&self, topic: &Topic, body: &[u8], reason: &str)
        -> Result<(), BrokerError>;

    /// Starts a manual-ack consumer on the topic's queue.
    async fn consume(
        &self,
        topic: &Topic,
        prefetch: u16,
    ) -> Result<Box<dyn DeliveryStream>, BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_letter_queue_is_derived_from_queue() {
        let topic = Topic::payment_confirmation();
        assert_eq!(topic.dead_letter_queue(), "orders.payment-confirmation.dead-letter");
        assert_ne!(
            Topic::payment_confirmation(),
            Topic::shipment_completion()
        );
    }
}
