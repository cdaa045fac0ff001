use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    Acknowledger, BrokerError, DelayedBroker, Delivery, DeliveryStream, OutgoingMessage, Topic,
};

#[derive(Debug, Clone)]
struct Envelope {
    body: Vec<u8>,
    attempt: u32,
    redelivered: bool,
}

struct QueueState {
    exchange: String,
    tx: mpsc::UnboundedSender<Envelope>,
    rx: Option<mpsc::UnboundedReceiver<Envelope>>,
}

/// A publish as seen by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub body: Vec<u8>,
    pub delay: Duration,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub queue: String,
    pub body: Vec<u8>,
    pub reason: String,
}

/// Publishes and dead letters kept for inspection by default
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// Delayed broker backed by tokio timers. Messages survive only as long as
/// the process, so it is meant for local runs and tests. The publish log and
/// the dead-letter record keep only the most recent `history_limit` entries.
#[derive(Clone)]
pub struct InMemoryBroker {
    queues: Arc<Mutex<HashMap<String, QueueState>>>,
    published: Arc<Mutex<VecDeque<PublishedMessage>>>,
    dead_letters: Arc<Mutex<VecDeque<DeadLetter>>>,
    history_limit: usize,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

fn poisoned<T>(_: T) -> BrokerError {
    BrokerError::Connection("in-memory broker lock poisoned".to_string())
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            queues: Arc::default(),
            published: Arc::default(),
            dead_letters: Arc::default(),
            history_limit,
        }
    }

    /// Recently accepted messages, in publish order
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn published_to(&self, topic: &Topic) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.exchange == topic.exchange)
            .collect()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters
            .lock()
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn sender_for(&self, topic: &Topic) -> Result<mpsc::UnboundedSender<Envelope>, BrokerError> {
        let queues = self.queues.lock().map_err(poisoned)?;
        queues
            .get(&topic.queue)
            .filter(|q| q.exchange == topic.exchange)
            .map(|q| q.tx.clone())
            .ok_or_else(|| {
                BrokerError::Publish(format!("exchange '{}' is not declared", topic.exchange))
            })
    }
}

fn record<T>(log: &Mutex<VecDeque<T>>, entry: T, limit: usize) -> Result<(), BrokerError> {
    let mut log = log.lock().map_err(poisoned)?;
    if limit == 0 {
        return Ok(());
    }
    while log.len() >= limit {
        log.pop_front();
    }
    log.push_back(entry);
    Ok(())
}

fn deliver_later(tx: mpsc::UnboundedSender<Envelope>, envelope: Envelope, delay: Duration) {
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        // A closed receiver means the consumer went away with the process
        let _ = tx.send(envelope);
    });
}

#[async_trait]
impl DelayedBroker for InMemoryBroker {
    async fn declare(&self, topic: &Topic) -> Result<(), BrokerError> {
        let mut queues = self.queues.lock().map_err(poisoned)?;
        if let Some(existing) = queues.get(&topic.queue) {
            if existing.exchange != topic.exchange {
                return Err(BrokerError::Declare(format!(
                    "queue '{}' is already bound to '{}'",
                    topic.queue, existing.exchange
                )));
            }
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        queues.insert(
            topic.queue.clone(),
            QueueState {
                exchange: topic.exchange.clone(),
                tx,
                rx: Some(rx),
            },
        );
        debug!(exchange = %topic.exchange, queue = %topic.queue, "Declared in-memory queue");
        Ok(())
    }

    async fn publish(&self, topic: &Topic, message: OutgoingMessage) -> Result<(), BrokerError> {
        let tx = self.sender_for(topic)?;

        record(
            &self.published,
            PublishedMessage {
                exchange: topic.exchange.clone(),
                body: message.body.clone(),
                delay: message.delay,
                attempt: message.attempt,
            },
            self.history_limit,
        )?;

        deliver_later(
            tx,
            Envelope {
                body: message.body,
                attempt: message.attempt,
                redelivered: false,
            },
            message.delay,
        );
        Ok(())
    }

    async fn dead_letter(
        &self,
        topic: &Topic,
        body: &[u8],
        reason: &str,
    ) -> Result<(), BrokerError> {
        debug!(queue = %topic.dead_letter_queue(), %reason, "Dead-lettered in-memory message");
        record(
            &self.dead_letters,
            DeadLetter {
                queue: topic.dead_letter_queue(),
                body: body.to_vec(),
                reason: reason.to_string(),
            },
            self.history_limit,
        )
    }

    async fn consume(
        &self,
        topic: &Topic,
        _prefetch: u16,
    ) -> Result<Box<dyn DeliveryStream>, BrokerError> {
        let mut queues = self.queues.lock().map_err(poisoned)?;
        let state = queues
            .get_mut(&topic.queue)
            .ok_or_else(|| BrokerError::Consume(format!("queue '{}' is not declared", topic.queue)))?;
        let rx = state.rx.take().ok_or_else(|| {
            BrokerError::Consume(format!("queue '{}' already has a consumer", topic.queue))
        })?;

        Ok(Box::new(InMemoryStream {
            rx,
            tx: state.tx.clone(),
        }))
    }
}

struct InMemoryStream {
    rx: mpsc::UnboundedReceiver<Envelope>,
    tx: mpsc::UnboundedSender<Envelope>,
}

#[async_trait]
impl DeliveryStream for InMemoryStream {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, BrokerError>> {
        let envelope = self.rx.recv().await?;
        let acker = InMemoryAcker {
            tx: self.tx.clone(),
            envelope: envelope.clone(),
        };
        Some(Ok(Delivery::new(
            envelope.body,
            envelope.attempt,
            envelope.redelivered,
            Box::new(acker),
        )))
    }
}

struct InMemoryAcker {
    tx: mpsc::UnboundedSender<Envelope>,
    envelope: Envelope,
}

#[async_trait]
impl Acknowledger for InMemoryAcker {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn requeue(self: Box<Self>) -> Result<(), BrokerError> {
        let envelope = Envelope {
            redelivered: true,
            ..self.envelope
        };
        self.tx
            .send(envelope)
            .map_err(|_| BrokerError::Ack("queue closed".to_string()))
    }
}
