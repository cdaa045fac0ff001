use backon::{BackoffBuilder, ExponentialBuilder};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::message_queue::{BrokerError, DelayedBroker, Delivery, OutgoingMessage, Topic};
use crate::services::order_status::TransitionOutcome;

use super::{RetryPolicy, StatusHandler};

/// What happened to one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Handler succeeded, possibly as a guarded no-op
    Completed(TransitionOutcome),
    /// Republished for another attempt
    Retried { attempt: u32, delay: Duration },
    /// Parked on the dead-letter queue
    DeadLettered { reason: String },
    /// Republish or dead-letter failed; the broker will redeliver
    Requeued,
}

enum Stop {
    Shutdown,
    StreamClosed,
}

/// Long-running consumer for one delayed topic
pub struct StatusConsumer {
    broker: Arc<dyn DelayedBroker>,
    handler: Arc<dyn StatusHandler>,
    policy: RetryPolicy,
    prefetch: u16,
    topic: Topic,
}

impl StatusConsumer {
    pub fn new(
        broker: Arc<dyn DelayedBroker>,
        handler: Arc<dyn StatusHandler>,
        policy: RetryPolicy,
        prefetch: u16,
    ) -> Self {
        let topic = handler.topic();
        Self {
            broker,
            handler,
            policy,
            prefetch,
            topic,
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Handles one delivery and settles it with the broker.
    ///
    /// The delivery is acknowledged only after the transition succeeded or
    /// after the failed message was republished or dead-lettered.
    pub async fn process(&self, delivery: Delivery) -> Result<Disposition, BrokerError> {
        let queue = self.topic.queue.clone();

        let err = match self.handler.handle(&delivery.body).await {
            Ok(outcome) => {
                match outcome {
                    TransitionOutcome::Applied(rows) => {
                        debug!(queue = %queue, rows, "Delayed transition applied")
                    }
                    TransitionOutcome::Skipped => info!(
                        queue = %queue,
                        redelivered = delivery.redelivered,
                        "Delayed transition skipped, status already moved on"
                    ),
                }
                delivery.ack().await?;
                return Ok(Disposition::Completed(outcome));
            }
            Err(err) => err,
        };

        let settled = if err.is_retryable() && self.policy.allows_retry_after(delivery.attempt) {
            let attempt = delivery.attempt + 1;
            let delay = self.policy.delay_for(delivery.attempt);
            warn!(queue = %queue, attempt, ?delay, error = %err, "Status transition failed, retrying");

            self.broker
                .publish(
                    &self.topic,
                    OutgoingMessage::new(delivery.body.clone(), delay).with_attempt(attempt),
                )
                .await
                .map(|_| {
                    counter!("pharmacy_orders.consumer_retries", 1, "queue" => queue.clone());
                    Disposition::Retried { attempt, delay }
                })
        } else {
            let reason = if err.is_retryable() {
                format!("gave up after {} attempts: {}", delivery.attempt + 1, err)
            } else {
                err.to_string()
            };
            error!(queue = %queue, attempt = delivery.attempt, %reason, "Dead-lettering status message");

            self.broker
                .dead_letter(&self.topic, &delivery.body, &reason)
                .await
                .map(|_| {
                    counter!("pharmacy_orders.consumer_dead_letters", 1, "queue" => queue.clone());
                    Disposition::DeadLettered { reason }
                })
        };

        match settled {
            Ok(disposition) => {
                delivery.ack().await?;
                Ok(disposition)
            }
            Err(publish_err) => {
                error!(queue = %queue, error = %publish_err, "Could not park failed message, requeueing");
                delivery.requeue().await?;
                Ok(Disposition::Requeued)
            }
        }
    }

    /// Consumes until shutdown, reconnecting with backoff when the stream
    /// breaks.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(queue = %self.topic.queue, "Starting status consumer");
        let mut backoff = reconnect_backoff();

        loop {
            match self.consume(&mut shutdown).await {
                Ok(Stop::Shutdown) => break,
                Ok(Stop::StreamClosed) => {
                    warn!(queue = %self.topic.queue, "Delivery stream closed");
                    backoff = reconnect_backoff();
                }
                Err(e) => error!(queue = %self.topic.queue, error = %e, "Consumer failed"),
            }

            let delay = backoff.next().unwrap_or(Duration::from_secs(30));
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(queue = %self.topic.queue, "Status consumer stopped");
    }

    async fn consume(&self, shutdown: &mut watch::Receiver<bool>) -> Result<Stop, BrokerError> {
        self.broker.declare(&self.topic).await?;
        let mut stream = self.broker.consume(&self.topic, self.prefetch).await?;

        loop {
            if *shutdown.borrow() {
                return Ok(Stop::Shutdown);
            }

            let next = tokio::select! {
                next = stream.next_delivery() => next,
                _ = shutdown.changed() => return Ok(Stop::Shutdown),
            };

            match next {
                Some(Ok(delivery)) => {
                    if let Err(e) = self.process(delivery).await {
                        error!(queue = %self.topic.queue, error = %e, "Failed to settle delivery");
                    }
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(Stop::StreamClosed),
            }
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

fn reconnect_backoff() -> impl Iterator<Item = Duration> {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(30))
        .without_max_times()
        .with_jitter()
        .build()
}
