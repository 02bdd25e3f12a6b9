//! Durable, at-least-once message bus port.
//!
//! - `MessageBus` -- publish to a topic, open a durable subscription
//! - `Subscription` -- pull deliveries one at a time, ack or nak each
//! - `memory` -- `InMemoryBus`, a process-local implementation
//!
//! A delivery that is neither acked nor nak'd within the bus's ack wait is
//! redelivered. Durable subscriptions with the same name share one cursor,
//! so several consumer loops (or processes) split the stream between them.

pub mod memory;

use chrono::{DateTime, Utc};
use roompurge_types::error::BusError;
use roompurge_types::purge::Headers;

pub use memory::InMemoryBus;

/// Topic (before prefixing) carrying purge notifications.
pub const ROOM_PURGE_TOPIC: &str = "RoomPurge";

/// Durable consumer (before prefixing) of the account-data service.
pub const ROOM_PURGE_DURABLE: &str = "UserAPIRoomPurgeConsumer";

/// Where a brand-new durable subscription starts reading.
///
/// Existing durables always resume from their stored position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverPolicy {
    /// Replay everything still retained on the topic.
    All,
    /// Only messages published after the subscription is created.
    New,
}

/// A message as stored on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Monotonic per-bus sequence number.
    pub id: u64,
    pub topic: String,
    pub headers: Headers,
    pub published_at: DateTime<Utc>,
}

/// One delivery of a message to a durable consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message: BusMessage,
    /// 1 for the first delivery, incremented on each redelivery.
    pub attempt: u32,
}

pub trait MessageBus: Send + Sync {
    type Subscription: Subscription;

    /// Append a message to the topic. Returns its sequence number.
    fn publish(
        &self,
        topic: &str,
        headers: Headers,
    ) -> impl std::future::Future<Output = Result<u64, BusError>> + Send;

    /// Open (or resume) the durable subscription `durable` on `topic`.
    fn subscribe(
        &self,
        topic: &str,
        durable: &str,
        policy: DeliverPolicy,
    ) -> impl std::future::Future<Output = Result<Self::Subscription, BusError>> + Send;
}

pub trait Subscription: Send {
    /// Wait until a message is deliverable and claim it.
    ///
    /// Returns `BusError::Closed` once the bus has been shut down.
    fn next(&mut self) -> impl std::future::Future<Output = Result<Delivery, BusError>> + Send;

    /// Mark the delivery as processed; it will not be redelivered.
    fn ack(
        &mut self,
        delivery: &Delivery,
    ) -> impl std::future::Future<Output = Result<(), BusError>> + Send;

    /// Hand the delivery back for redelivery after the bus's redelivery delay.
    fn nak(
        &mut self,
        delivery: &Delivery,
    ) -> impl std::future::Future<Output = Result<(), BusError>> + Send;
}
