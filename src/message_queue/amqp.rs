//! RabbitMQ broker using the delayed message exchange plugin.
//!
//! Each topic is an `x-delayed-message` exchange (fanout underneath) with one
//! durable queue bound by an empty routing key. Messages carry their delay in
//! the `x-delay` header and are persistent.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use deadpool_lapin::{Manager, Pool, PoolError};
use futures::StreamExt;
use lapin::{
    acker::Acker,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties, Channel, ExchangeKind,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{
    Acknowledger, BrokerError, DelayedBroker, Delivery, DeliveryStream, OutgoingMessage, Topic,
    ATTEMPT_HEADER, DEAD_LETTER_REASON_HEADER, DELAY_HEADER,
};

const DELAYED_EXCHANGE_KIND: &str = "x-delayed-message";
const MAX_PUBLISH_RETRIES: usize = 3;

pub struct AmqpBroker {
    pool: Pool,
}

impl AmqpBroker {
    /// Create a pooled connection and verify the broker is reachable.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let manager = Manager::new(url.to_string(), Default::default());
        let pool = Pool::builder(manager)
            .max_size(10)
            .build()
            .map_err(|e| BrokerError::Connection(format!("Failed to create pool: {}", e)))?;

        pool.get()
            .await
            .map_err(|e| BrokerError::Connection(format!("Failed to connect: {}", e)))?;

        info!("Connected to AMQP broker");
        Ok(Self { pool })
    }

    async fn channel(&self) -> Result<Channel, BrokerError> {
        let conn = self.pool.get().await.map_err(|e: PoolError| {
            BrokerError::Connection(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.create_channel()
            .await
            .map_err(|e| BrokerError::Connection(format!("Failed to create channel: {}", e)))
    }

    /// Publish with publisher confirms, retrying on a fresh channel.
    async fn publish_confirmed(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        headers: FieldTable,
    ) -> Result<(), BrokerError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(MAX_PUBLISH_RETRIES)
            .with_jitter()
            .build();

        let mut last_error = None;

        for (attempt, delay) in std::iter::once(Duration::ZERO).chain(backoff).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }

            match self.try_publish(exchange, routing_key, body, headers.clone()).await {
                Ok(()) => {
                    debug!(exchange = %exchange, routing_key = %routing_key, "Published message");
                    return Ok(());
                }
                Err(e) => {
                    error!(
                        attempt = attempt + 1,
                        max_retries = MAX_PUBLISH_RETRIES,
                        error = %e,
                        "Publish failed, retrying..."
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BrokerError::Publish("Max retries exceeded".to_string())))
    }

    async fn try_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        headers: FieldTable,
    ) -> Result<(), BrokerError> {
        let channel = self.channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| BrokerError::Publish(format!("Failed to enable confirms: {}", e)))?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2) // persistent
            .with_message_id(Uuid::new_v4().to_string().into())
            .with_headers(headers);

        let confirmation = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await
            .map_err(|e| BrokerError::Publish(format!("Failed to publish: {}", e)))?
            .await
            .map_err(|e| BrokerError::Publish(format!("Publish confirmation failed: {}", e)))?;

        if confirmation.is_nack() {
            return Err(BrokerError::Publish("Broker rejected the message".to_string()));
        }
        Ok(())
    }
}

fn headers(entries: Vec<(&str, AMQPValue)>) -> FieldTable {
    let map: BTreeMap<ShortString, AMQPValue> = entries
        .into_iter()
        .map(|(key, value)| (ShortString::from(key), value))
        .collect();
    FieldTable::from(map)
}

fn attempt_from(properties: &BasicProperties) -> u32 {
    properties
        .headers()
        .as_ref()
        .and_then(|h| h.inner().get(ATTEMPT_HEADER))
        .and_then(|value| match value {
            AMQPValue::LongUInt(n) => Some(*n),
            AMQPValue::LongLongInt(n) => u32::try_from(*n).ok(),
            AMQPValue::LongInt(n) => u32::try_from(*n).ok(),
            AMQPValue::ShortUInt(n) => Some(u32::from(*n)),
            _ => None,
        })
        .unwrap_or(0)
}

#[async_trait]
impl DelayedBroker for AmqpBroker {
    async fn declare(&self, topic: &Topic) -> Result<(), BrokerError> {
        let channel = self.channel().await?;

        channel
            .exchange_declare(
                &topic.exchange,
                ExchangeKind::Custom(DELAYED_EXCHANGE_KIND.to_string()),
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                headers(vec![(
                    "x-delayed-type",
                    AMQPValue::LongString("fanout".into()),
                )]),
            )
            .await
            .map_err(|e| BrokerError::Declare(format!("Failed to declare exchange: {}", e)))?;

        for queue in [topic.queue.clone(), topic.dead_letter_queue()] {
            channel
                .queue_declare(
                    &queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| BrokerError::Declare(format!("Failed to declare queue: {}", e)))?;
        }

        channel
            .queue_bind(
                &topic.queue,
                &topic.exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Declare(format!("Failed to bind queue: {}", e)))?;

        info!(exchange = %topic.exchange, queue = %topic.queue, "Declared delayed topic");
        Ok(())
    }

    #[tracing::instrument(name = "broker.publish", skip_all, fields(exchange = %topic.exchange, attempt = message.attempt))]
    async fn publish(&self, topic: &Topic, message: OutgoingMessage) -> Result<(), BrokerError> {
        let delay_ms = i64::try_from(message.delay.as_millis()).unwrap_or(i64::MAX);
        let headers = headers(vec![
            (DELAY_HEADER, AMQPValue::LongLongInt(delay_ms)),
            (ATTEMPT_HEADER, AMQPValue::LongUInt(message.attempt)),
        ]);
        self.publish_confirmed(&topic.exchange, "", &message.body, headers)
            .await
    }

    async fn dead_letter(
        &self,
        topic: &Topic,
        body: &[u8],
        reason: &str,
    ) -> Result<(), BrokerError> {
        let headers = headers(vec![(
            DEAD_LETTER_REASON_HEADER,
            AMQPValue::LongString(reason.to_string().into()),
        )]);
        // Default exchange routes by queue name
        self.publish_confirmed("", &topic.dead_letter_queue(), body, headers)
            .await
    }

    async fn consume(
        &self,
        topic: &Topic,
        prefetch: u16,
    ) -> Result<Box<dyn DeliveryStream>, BrokerError> {
        let channel = self.channel().await?;
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Consume(format!("Failed to set prefetch: {}", e)))?;

        let consumer = channel
            .basic_consume(
                &topic.queue,
                &format!("{}-{}", topic.queue, Uuid::new_v4()),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume(format!("Failed to start consumer: {}", e)))?;

        Ok(Box::new(AmqpStream {
            consumer,
            _channel: channel,
        }))
    }
}

struct AmqpStream {
    consumer: lapin::Consumer,
    // Keeps the channel open for as long as the consumer lives
    _channel: Channel,
}

#[async_trait]
impl DeliveryStream for AmqpStream {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, BrokerError>> {
        let next = self.consumer.next().await?;
        Some(
            next.map(|delivery| {
                let attempt = attempt_from(&delivery.properties);
                Delivery::new(
                    delivery.data,
                    attempt,
                    delivery.redelivered,
                    Box::new(AmqpAcker(delivery.acker)),
                )
            })
            .map_err(|e| BrokerError::Consume(format!("Consumer delivery error: {}", e))),
        )
    }
}

struct AmqpAcker(Acker);

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }

    async fn requeue(self: Box<Self>) -> Result<(), BrokerError> {
        self.0
            .nack(BasicNackOptions {
                requeue: true,
                ..Default::default()
            })
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }
}
