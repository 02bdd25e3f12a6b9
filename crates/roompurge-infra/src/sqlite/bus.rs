//! SQLite-backed durable message bus.
//!
//! Messages are appended to `bus_messages`. Each durable consumer has a row
//! in `bus_consumers` holding the highest message id handed out, and one
//! `bus_deliveries` row per unacked delivery. A delivery becomes claimable
//! again once its `available_at` passes: `ack_wait` after it was handed out,
//! or `redelivery_delay` after a nak. Consumer state lives in the database,
//! so a restarted process resumes where it stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use roompurge_core::bus::{BusMessage, DeliverPolicy, Delivery, MessageBus, Subscription};
use roompurge_types::config::BusConfig;
use roompurge_types::error::{BusError, RepositoryError};
use roompurge_types::purge::Headers;
use sqlx::Row;
use tokio::sync::Notify;

use super::pool::DatabasePool;
use super::{db_error, format_datetime, parse_datetime};

/// SQLite-backed implementation of `MessageBus`.
#[derive(Clone)]
pub struct SqliteMessageBus {
    inner: Arc<Inner>,
}

struct Inner {
    pool: DatabasePool,
    ack_wait: Duration,
    redelivery_delay: Duration,
    poll_interval: Duration,
    /// Wakes local subscribers on local publishes. Publishes from other
    /// processes are seen at the next poll.
    notify: Notify,
    closed: AtomicBool,
}

impl SqliteMessageBus {
    pub fn new(pool: DatabasePool, config: &BusConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                ack_wait: config.ack_wait(),
                redelivery_delay: config.redelivery_delay(),
                poll_interval: config.poll_interval(),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Shut the bus down. Pending `next()` calls return `BusError::Closed`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Number of deliveries of `durable` still awaiting an ack.
    pub async fn pending_count(&self, durable: &str) -> Result<u64, BusError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bus_deliveries WHERE durable = ?")
            .bind(durable)
            .fetch_one(&self.inner.pool.reader)
            .await
            .map_err(db_error)?;
        Ok(count as u64)
    }

    /// Number of messages on `topic` that `durable` has not been handed yet.
    pub async fn backlog(&self, topic: &str, durable: &str) -> Result<u64, BusError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM bus_messages
               WHERE topic = ?
                 AND id > COALESCE((SELECT last_delivered_id FROM bus_consumers WHERE durable = ?), 0)"#,
        )
        .bind(topic)
        .bind(durable)
        .fetch_one(&self.inner.pool.reader)
        .await
        .map_err(db_error)?;
        Ok(count as u64)
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<BusMessage, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(db_error)?;
    let topic: String = row.try_get("topic").map_err(db_error)?;
    let headers: String = row.try_get("headers").map_err(db_error)?;
    let published_at: String = row.try_get("published_at").map_err(db_error)?;

    let headers: Headers = serde_json::from_str(&headers)
        .map_err(|e| RepositoryError::InvalidData(format!("invalid headers: {e}")))?;

    Ok(BusMessage {
        id: id as u64,
        topic,
        headers,
        published_at: parse_datetime(&published_at)?,
    })
}

/// Outcome of one claim attempt.
enum Claim {
    Delivered(Delivery),
    /// The claimed message could not be decoded and was dropped.
    Dropped,
    Idle,
}

impl Inner {
    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }

    /// Claim the next deliverable message for `durable` inside one writer
    /// transaction. Due redeliveries go first. A stored message that no
    /// longer decodes is dropped so it cannot block the durable.
    async fn claim(&self, durable: &str) -> Result<Claim, RepositoryError> {
        let now = now_millis();
        let next_deadline = now + millis(self.ack_wait);
        let mut tx = self.pool.writer.begin().await.map_err(db_error)?;

        let due = sqlx::query(
            r#"SELECT message_id, attempt FROM bus_deliveries
               WHERE durable = ? AND available_at <= ?
               ORDER BY message_id LIMIT 1"#,
        )
        .bind(durable)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;

        let (message_id, attempt) = match due {
            Some(row) => {
                let message_id: i64 = row.try_get("message_id").map_err(db_error)?;
                let attempt: i64 = row.try_get("attempt").map_err(db_error)?;
                sqlx::query(
                    r#"UPDATE bus_deliveries SET attempt = attempt + 1, available_at = ?
                       WHERE durable = ? AND message_id = ?"#,
                )
                .bind(next_deadline)
                .bind(durable)
                .bind(message_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
                (message_id, attempt + 1)
            }
            None => {
                let next: Option<i64> = sqlx::query_scalar(
                    r#"SELECT m.id FROM bus_messages m
                       JOIN bus_consumers c ON c.topic = m.topic
                       WHERE c.durable = ? AND m.id > c.last_delivered_id
                       ORDER BY m.id LIMIT 1"#,
                )
                .bind(durable)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?;

                let Some(message_id) = next else {
                    return Ok(Claim::Idle);
                };
                sqlx::query("UPDATE bus_consumers SET last_delivered_id = ? WHERE durable = ?")
                    .bind(message_id)
                    .bind(durable)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error)?;
                sqlx::query(
                    r#"INSERT INTO bus_deliveries (durable, message_id, attempt, available_at)
                       VALUES (?, ?, 1, ?)"#,
                )
                .bind(durable)
                .bind(message_id)
                .bind(next_deadline)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
                (message_id, 1)
            }
        };

        let row = sqlx::query("SELECT id, topic, headers, published_at FROM bus_messages WHERE id = ?")
            .bind(message_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;
        let message = match message_from_row(&row) {
            Ok(message) => message,
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                sqlx::query("DELETE FROM bus_deliveries WHERE durable = ? AND message_id = ?")
                    .bind(durable)
                    .bind(message_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error)?;
                tx.commit().await.map_err(db_error)?;
                tracing::error!(%durable, message_id, error = %e, "dropped undecodable bus message");
                return Ok(Claim::Dropped);
            }
        };

        tx.commit().await.map_err(db_error)?;
        Ok(Claim::Delivered(Delivery {
            message,
            attempt: attempt as u32,
        }))
    }
}

impl MessageBus for SqliteMessageBus {
    type Subscription = SqliteSubscription;

    async fn publish(&self, topic: &str, headers: Headers) -> Result<u64, BusError> {
        self.inner.ensure_open()?;

        let encoded = serde_json::to_string(&headers)
            .map_err(|e| BusError::Malformed(format!("failed to encode headers: {e}")))?;
        let result = sqlx::query(
            "INSERT INTO bus_messages (topic, headers, published_at) VALUES (?, ?, ?)",
        )
        .bind(topic)
        .bind(&encoded)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.inner.pool.writer)
        .await
        .map_err(db_error)?;

        let id = result.last_insert_rowid() as u64;
        self.inner.notify.notify_waiters();
        tracing::debug!(%topic, message_id = id, "published message");
        Ok(id)
    }

    async fn subscribe(
        &self,
        topic: &str,
        durable: &str,
        policy: DeliverPolicy,
    ) -> Result<SqliteSubscription, BusError> {
        self.inner.ensure_open()?;

        let start: i64 = match policy {
            DeliverPolicy::All => 0,
            DeliverPolicy::New => {
                sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM bus_messages WHERE topic = ?")
                    .bind(topic)
                    .fetch_one(&self.inner.pool.writer)
                    .await
                    .map_err(db_error)?
            }
        };

        sqlx::query(
            r#"INSERT INTO bus_consumers (durable, topic, last_delivered_id, created_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (durable) DO NOTHING"#,
        )
        .bind(durable)
        .bind(topic)
        .bind(start)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.inner.pool.writer)
        .await
        .map_err(db_error)?;

        tracing::debug!(%topic, %durable, "durable subscription opened");
        Ok(SqliteSubscription {
            inner: Arc::clone(&self.inner),
            durable: durable.to_string(),
        })
    }
}

/// A handle on one durable consumer of a [`SqliteMessageBus`].
pub struct SqliteSubscription {
    inner: Arc<Inner>,
    durable: String,
}

impl Subscription for SqliteSubscription {
    async fn next(&mut self) -> Result<Delivery, BusError> {
        loop {
            self.inner.ensure_open()?;
            let notified = self.inner.notify.notified();
            match self.inner.claim(&self.durable).await? {
                Claim::Delivered(delivery) => return Ok(delivery),
                Claim::Dropped => continue,
                Claim::Idle => {
                    let _ = tokio::time::timeout(self.inner.poll_interval, notified).await;
                }
            }
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BusError> {
        sqlx::query("DELETE FROM bus_deliveries WHERE durable = ? AND message_id = ?")
            .bind(&self.durable)
            .bind(delivery.message.id as i64)
            .execute(&self.inner.pool.writer)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn nak(&mut self, delivery: &Delivery) -> Result<(), BusError> {
        sqlx::query(
            "UPDATE bus_deliveries SET available_at = ? WHERE durable = ? AND message_id = ?",
        )
        .bind(now_millis() + millis(self.inner.redelivery_delay))
        .bind(&self.durable)
        .bind(delivery.message.id as i64)
        .execute(&self.inner.pool.writer)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteMessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMessageBus")
            .field("ack_wait", &self.inner.ack_wait)
            .field("redelivery_delay", &self.inner.redelivery_delay)
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}
