//! Periodic re-publication of purges the forget path failed to publish.

use std::sync::Arc;
use std::time::Duration;

use roompurge_types::error::RepositoryError;
use roompurge_types::purge::PurgeNotification;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::forget::publish_purge;
use crate::bus::MessageBus;
use crate::repository::membership::MembershipRepository;

/// Rooms handled per sweep pass.
const SWEEP_BATCH: u32 = 500;

pub struct PurgeSweeper<M, B> {
    memberships: Arc<M>,
    bus: Arc<B>,
    topic: String,
}

impl<M, B> PurgeSweeper<M, B>
where
    M: MembershipRepository,
    B: MessageBus,
{
    pub fn new(memberships: Arc<M>, bus: Arc<B>, topic: impl Into<String>) -> Self {
        Self {
            memberships,
            bus,
            topic: topic.into(),
        }
    }

    /// Publish a room purge for every room still pending one.
    ///
    /// Returns how many purges were published. Stops at the first bus
    /// failure; the remaining rooms are picked up by the next pass.
    pub async fn sweep_once(&self) -> Result<usize, RepositoryError> {
        let rooms = self.memberships.rooms_pending_purge(SWEEP_BATCH).await?;

        let mut published = 0;
        for room_id in rooms {
            let notification = PurgeNotification::RoomScopedPurge { room_id };
            match publish_purge(&*self.memberships, &*self.bus, &self.topic, &notification).await {
                Ok(_) => published += 1,
                Err(e) => {
                    tracing::warn!(
                        room_id = %notification.room_id(),
                        error = %e,
                        "sweep failed to publish purge"
                    );
                    break;
                }
            }
        }
        Ok(published)
    }

    /// Sweep every `interval` until `shutdown` is cancelled.
    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = interval.as_secs(), "purge sweep started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => match self.sweep_once().await {
                    Ok(0) => {}
                    Ok(published) => tracing::info!(published, "sweep published missed purges"),
                    Err(e) => tracing::warn!(error = %e, "purge sweep failed"),
                },
            }
        }
        tracing::info!("purge sweep stopped");
    }
}
