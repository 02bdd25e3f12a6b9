//! Purge consumer of the account-data service.
//!
//! Subscribes durably to the room-purge topic and deletes the local
//! artifacts of each room it is told about. A message is acked only once
//! its purge has finished or can never succeed.

use std::sync::Arc;
use std::time::Duration;

use roompurge_types::account_data::{DIRECT, PUSH_RULES};
use roompurge_types::error::{BusError, RepositoryError};
use roompurge_types::id::{RoomId, ServerName, UserId};
use roompurge_types::purge::{Headers, PurgeNotification};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::bus::{DeliverPolicy, MessageBus, Subscription};
use crate::prune::{prune_direct_rooms, prune_push_rules};
use crate::repository::account_data::AccountDataRepository;

/// Pause after a bus error before asking for the next delivery again.
const BUS_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What to tell the bus about a handled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done, or can never succeed: do not redeliver.
    Ack,
    /// Failed transiently: redeliver later.
    Retry,
}

pub struct PurgeConsumer<A> {
    account_data: Arc<A>,
    server_name: ServerName,
}

impl<A: AccountDataRepository> PurgeConsumer<A> {
    pub fn new(account_data: Arc<A>, server_name: ServerName) -> Self {
        Self {
            account_data,
            server_name,
        }
    }

    /// Handle one bus message.
    pub async fn on_message(&self, headers: &Headers) -> Disposition {
        match PurgeNotification::from_headers(headers) {
            Ok(None) => {
                tracing::debug!("purge message without room or user, ignoring");
                Disposition::Ack
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed purge message, dropping");
                Disposition::Ack
            }
            Ok(Some(PurgeNotification::RoomScopedPurge { room_id })) => {
                self.purge_room(&room_id).await
            }
            Ok(Some(PurgeNotification::UserScopedCleanup { user_id, room_id })) => {
                self.cleanup_user_data(&user_id, &room_id).await;
                Disposition::Ack
            }
        }
    }

    /// Delete every local notification and room account-data row of the room.
    #[tracing::instrument(skip_all, fields(room_id = %room_id))]
    pub async fn purge_room(&self, room_id: &RoomId) -> Disposition {
        match self.delete_room_artifacts(room_id).await {
            Ok((notifications, account_data)) => {
                tracing::info!(notifications, account_data, "room purged");
                Disposition::Ack
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "room purge failed, will retry");
                Disposition::Retry
            }
            Err(e) => {
                tracing::error!(error = %e, "room purge failed permanently, dropping message");
                Disposition::Ack
            }
        }
    }

    async fn delete_room_artifacts(&self, room_id: &RoomId) -> Result<(u64, u64), RepositoryError> {
        let notifications = self.account_data.delete_notifications_for_room(room_id).await?;
        let account_data = self.account_data.delete_account_data_for_room(room_id).await?;
        Ok((notifications, account_data))
    }

    /// Remove one user's artifacts of the room and prune the room from
    /// their push rules and direct-message map.
    ///
    /// Every step runs even if an earlier one failed.
    #[tracing::instrument(skip_all, fields(user_id = %user_id, room_id = %room_id))]
    pub async fn cleanup_user_data(&self, user_id: &UserId, room_id: &RoomId) {
        if !user_id.is_local(&self.server_name) {
            tracing::warn!("user is not local to this server, nothing to clean up");
            return;
        }
        let localpart = user_id.localpart();

        if let Err(e) = self
            .account_data
            .delete_notifications_for_user(localpart, room_id)
            .await
        {
            tracing::error!(error = %e, "failed to delete notifications");
        }
        if let Err(e) = self
            .account_data
            .delete_account_data_for_user(localpart, room_id)
            .await
        {
            tracing::error!(error = %e, "failed to delete room account data");
        }

        let mut global = match self.account_data.global_account_data(localpart).await {
            Ok(global) => global,
            Err(e) => {
                tracing::error!(error = %e, "failed to load global account data");
                return;
            }
        };

        if let Some(push_rules) = global.get_mut(PUSH_RULES) {
            if prune_push_rules(push_rules, room_id) {
                self.save_global(localpart, PUSH_RULES, push_rules).await;
            }
        }
        if let Some(direct) = global.get_mut(DIRECT) {
            if prune_direct_rooms(direct, room_id) {
                self.save_global(localpart, DIRECT, direct).await;
            }
        }
    }

    async fn save_global(&self, localpart: &str, data_type: &str, content: &serde_json::Value) {
        match self
            .account_data
            .save_account_data(localpart, None, data_type, content)
            .await
        {
            Ok(()) => tracing::debug!(data_type, "pruned global account data"),
            Err(e) => tracing::error!(data_type, error = %e, "failed to save pruned account data"),
        }
    }

    /// Subscribe `durable` to `topic`, replaying retained messages, and
    /// consume until shutdown.
    pub async fn subscribe_and_run<B: MessageBus>(
        &self,
        bus: &B,
        topic: &str,
        durable: &str,
        shutdown: CancellationToken,
    ) -> Result<(), BusError> {
        let subscription = bus.subscribe(topic, durable, DeliverPolicy::All).await?;
        tracing::info!(%topic, %durable, "purge consumer started");
        self.run(subscription, shutdown).await;
        Ok(())
    }

    /// Consume deliveries one at a time until shutdown or the bus closes.
    pub async fn run<S: Subscription>(&self, mut subscription: S, shutdown: CancellationToken) {
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = subscription.next() => next,
            };
            let delivery = match next {
                Ok(delivery) => delivery,
                Err(BusError::Closed) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to fetch purge message");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(BUS_ERROR_BACKOFF) => continue,
                    }
                }
            };

            let span = tracing::info_span!(
                "purge_message",
                message_id = delivery.message.id,
                attempt = delivery.attempt
            );
            let disposition = self
                .on_message(&delivery.message.headers)
                .instrument(span)
                .await;

            let settled = match disposition {
                Disposition::Ack => subscription.ack(&delivery).await,
                Disposition::Retry => subscription.nak(&delivery).await,
            };
            if let Err(e) = settled {
                tracing::warn!(
                    message_id = delivery.message.id,
                    error = %e,
                    "failed to settle purge message"
                );
            }
        }
        tracing::info!("purge consumer stopped");
    }
}
