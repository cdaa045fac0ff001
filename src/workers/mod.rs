//! Background consumers applying delayed status transitions.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::message_queue::{DelayedBroker, Topic};
use crate::services::order_status::{OrderStatusService, TransitionOutcome};

pub mod handlers;
pub mod status_consumer;

pub use handlers::{PaymentConfirmationHandler, ShipmentCompletionHandler};
pub use status_consumer::{Disposition, StatusConsumer};

/// Applies the transition carried by one kind of delayed message
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusHandler: Send + Sync {
    fn topic(&self) -> Topic;

    async fn handle(&self, body: &[u8]) -> Result<TransitionOutcome, ServiceError>;
}

/// How often a failing message is tried before it is dead-lettered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.consumer_max_attempts,
            config.consumer_retry_base_delay(),
        )
    }

    /// `base_delay * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(20)))
    }

    /// Whether a message that failed on `attempt` may be tried again
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts
    }
}

/// One consumer per delayed status topic
pub fn status_consumers(
    status: &OrderStatusService,
    broker: Arc<dyn DelayedBroker>,
    config: &AppConfig,
) -> Vec<StatusConsumer> {
    let policy = RetryPolicy::from_config(config);
    let handlers: [Arc<dyn StatusHandler>; 2] = [
        Arc::new(PaymentConfirmationHandler::new(status.clone())),
        Arc::new(ShipmentCompletionHandler::new(status.clone())),
    ];

    handlers
        .into_iter()
        .map(|handler| StatusConsumer::new(broker.clone(), handler, policy, config.consumer_prefetch))
        .collect()
}
