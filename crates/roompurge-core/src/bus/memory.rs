//! In-process message bus with durable cursors and ack-based redelivery.
//!
//! Each topic is an append-only log. Each durable consumer keeps a cursor
//! into its topic's log plus the set of deliveries awaiting an ack. Nothing
//! survives a process restart; use the SQLite bus for that.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use roompurge_types::error::BusError;
use roompurge_types::purge::Headers;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use super::{BusMessage, DeliverPolicy, Delivery, MessageBus, Subscription};

const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(30);

const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_secs(2);

/// Upper bound on how long an idle subscriber sleeps before re-checking
/// redelivery deadlines.
const IDLE_RECHECK: Duration = Duration::from_millis(50);

/// Process-local implementation of [`MessageBus`].
///
/// Cloning shares the same topics and consumers.
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

struct Inner {
    /// Per-topic append-only logs.
    topics: DashMap<String, Vec<BusMessage>>,
    /// Durable consumer state keyed by durable name.
    consumers: DashMap<String, ConsumerState>,
    next_id: AtomicU64,
    notify: Notify,
    closed: AtomicBool,
    ack_wait: Duration,
    redelivery_delay: Duration,
}

struct ConsumerState {
    topic: String,
    /// Index of the next never-delivered message in the topic log.
    cursor: usize,
    /// Deliveries awaiting ack, keyed by message id.
    pending: BTreeMap<u64, Pending>,
}

struct Pending {
    message: BusMessage,
    attempt: u32,
    redeliver_at: Instant,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_timing(DEFAULT_ACK_WAIT, DEFAULT_REDELIVERY_DELAY)
    }

    /// Create a bus with explicit ack-wait and nak redelivery delay.
    pub fn with_timing(ack_wait: Duration, redelivery_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: DashMap::new(),
                consumers: DashMap::new(),
                next_id: AtomicU64::new(0),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
                ack_wait,
                redelivery_delay,
            }),
        }
    }

    /// Shut the bus down. Pending `next()` calls return `BusError::Closed`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Snapshot of every message published to `topic`.
    pub fn messages(&self, topic: &str) -> Vec<BusMessage> {
        self.inner
            .topics
            .get(topic)
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Number of deliveries of `durable` still awaiting an ack.
    pub fn pending_count(&self, durable: &str) -> usize {
        self.inner
            .consumers
            .get(durable)
            .map(|c| c.pending.len())
            .unwrap_or(0)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }

    /// Claim the next deliverable message for `durable`, if any.
    ///
    /// Due redeliveries go first, then the next unseen message of the log.
    fn claim(&self, durable: &str) -> Option<Delivery> {
        let mut consumer = self.consumers.get_mut(durable)?;
        let now = Instant::now();

        let due = consumer
            .pending
            .iter()
            .find(|(_, p)| p.redeliver_at <= now)
            .map(|(id, _)| *id);
        if let Some(id) = due {
            let pending = consumer.pending.get_mut(&id)?;
            pending.attempt += 1;
            pending.redeliver_at = now + self.ack_wait;
            return Some(Delivery {
                message: pending.message.clone(),
                attempt: pending.attempt,
            });
        }

        let message = {
            let log = self.topics.get(&consumer.topic)?;
            log.get(consumer.cursor)?.clone()
        };
        consumer.cursor += 1;
        consumer.pending.insert(
            message.id,
            Pending {
                message: message.clone(),
                attempt: 1,
                redeliver_at: now + self.ack_wait,
            },
        );
        Some(Delivery {
            message,
            attempt: 1,
        })
    }
}

impl MessageBus for InMemoryBus {
    type Subscription = InMemorySubscription;

    async fn publish(&self, topic: &str, headers: Headers) -> Result<u64, BusError> {
        self.inner.ensure_open()?;

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message = BusMessage {
            id,
            topic: topic.to_string(),
            headers,
            published_at: Utc::now(),
        };
        self.inner
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(message);
        self.inner.notify.notify_waiters();

        debug!(%topic, message_id = id, "published message");
        Ok(id)
    }

    async fn subscribe(
        &self,
        topic: &str,
        durable: &str,
        policy: DeliverPolicy,
    ) -> Result<InMemorySubscription, BusError> {
        self.inner.ensure_open()?;

        let start = match policy {
            DeliverPolicy::All => 0,
            DeliverPolicy::New => self.inner.topics.get(topic).map(|l| l.len()).unwrap_or(0),
        };
        self.inner
            .consumers
            .entry(durable.to_string())
            .or_insert_with(|| ConsumerState {
                topic: topic.to_string(),
                cursor: start,
                pending: BTreeMap::new(),
            });

        debug!(%topic, %durable, "durable subscription opened");
        Ok(InMemorySubscription {
            inner: Arc::clone(&self.inner),
            durable: durable.to_string(),
        })
    }
}

/// A handle on one durable consumer of an [`InMemoryBus`].
pub struct InMemorySubscription {
    inner: Arc<Inner>,
    durable: String,
}

impl Subscription for InMemorySubscription {
    async fn next(&mut self) -> Result<Delivery, BusError> {
        loop {
            self.inner.ensure_open()?;
            // Register interest before checking so a publish in between still wakes us.
            let notified = self.inner.notify.notified();
            if let Some(delivery) = self.inner.claim(&self.durable) {
                return Ok(delivery);
            }
            let _ = tokio::time::timeout(IDLE_RECHECK, notified).await;
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BusError> {
        if let Some(mut consumer) = self.inner.consumers.get_mut(&self.durable) {
            consumer.pending.remove(&delivery.message.id);
        }
        Ok(())
    }

    async fn nak(&mut self, delivery: &Delivery) -> Result<(), BusError> {
        if let Some(mut consumer) = self.inner.consumers.get_mut(&self.durable) {
            if let Some(pending) = consumer.pending.get_mut(&delivery.message.id) {
                pending.redeliver_at = Instant::now() + self.inner.redelivery_delay;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBus")
            .field("topics", &self.inner.topics.len())
            .field("consumers", &self.inner.consumers.len())
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
