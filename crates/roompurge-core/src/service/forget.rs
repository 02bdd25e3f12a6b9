//! Forget coordinator of the room-state service.
//!
//! Marks a membership forgotten, then checks whether any local user is
//! still joined. When none is, a room-scoped purge notification is
//! published in the background. The caller only waits for the membership
//! write and the member check; publication problems are logged and left to
//! the sweep.

use std::sync::Arc;
use std::time::Duration;

use roompurge_types::config::RoomserverConfig;
use roompurge_types::error::{BusError, ForgetError};
use roompurge_types::id::{RoomId, UserId};
use roompurge_types::membership::ForgetTransition;
use roompurge_types::purge::PurgeNotification;
use tracing::Instrument;

use super::tasks::BackgroundTasks;
use crate::bus::MessageBus;
use crate::repository::membership::MembershipRepository;

/// Attempts per background publication before giving up until the next sweep.
const PUBLISH_ATTEMPTS: u32 = 3;

const PUBLISH_BACKOFF: Duration = Duration::from_millis(200);

/// Publish a purge notification on `topic`.
///
/// Room-scoped purges are also recorded in the membership store so the
/// sweep skips them. A failed record is logged, not returned: the message
/// is already on the bus and a duplicate publication is harmless.
pub async fn publish_purge<M, B>(
    memberships: &M,
    bus: &B,
    topic: &str,
    notification: &PurgeNotification,
) -> Result<u64, BusError>
where
    M: MembershipRepository,
    B: MessageBus,
{
    let message_id = bus.publish(topic, notification.to_headers()).await?;

    if let PurgeNotification::RoomScopedPurge { room_id } = notification {
        if let Err(e) = memberships.record_purge_published(room_id).await {
            tracing::warn!(%room_id, error = %e, "failed to record purge publication");
        }
        tracing::info!(%room_id, message_id, "room purge published");
    } else {
        tracing::debug!(room_id = %notification.room_id(), message_id, "user cleanup published");
    }
    Ok(message_id)
}

/// Forget coordinator, generic over the membership store and the bus.
pub struct ForgetService<M, B> {
    memberships: Arc<M>,
    bus: Arc<B>,
    topic: String,
    config: RoomserverConfig,
    tasks: BackgroundTasks,
}

impl<M, B> ForgetService<M, B>
where
    M: MembershipRepository + 'static,
    B: MessageBus + 'static,
{
    pub fn new(
        memberships: Arc<M>,
        bus: Arc<B>,
        topic: impl Into<String>,
        config: RoomserverConfig,
        tasks: BackgroundTasks,
    ) -> Self {
        Self {
            memberships,
            bus,
            topic: topic.into(),
            config,
            tasks,
        }
    }

    /// Mark the user's membership of the room as forgotten.
    ///
    /// Fails only if the user is still joined, was never a member, or the
    /// membership write fails. Forgetting an already-forgotten room
    /// succeeds and re-runs the member check.
    #[tracing::instrument(skip_all, fields(user_id = %user_id, room_id = %room_id))]
    pub async fn forget_room(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), ForgetError> {
        match self.memberships.forget(user_id, room_id).await? {
            ForgetTransition::Forgotten => tracing::info!("room forgotten"),
            ForgetTransition::AlreadyForgotten => tracing::debug!("room was already forgotten"),
            ForgetTransition::StillJoined => {
                return Err(ForgetError::StillJoined {
                    user_id: user_id.clone(),
                    room_id: room_id.clone(),
                });
            }
            ForgetTransition::NotMember => {
                return Err(ForgetError::NotMember {
                    user_id: user_id.clone(),
                    room_id: room_id.clone(),
                });
            }
        }

        if self.config.user_scoped_cleanup {
            self.publish_detached(PurgeNotification::UserScopedCleanup {
                user_id: user_id.clone(),
                room_id: room_id.clone(),
            });
        }

        if !self.config.purge_on_last_member {
            return Ok(());
        }

        match self.memberships.joined_local_members(room_id).await {
            Ok(0) => self.publish_detached(PurgeNotification::RoomScopedPurge {
                room_id: room_id.clone(),
            }),
            Ok(joined) => tracing::debug!(joined, "local members remain, room kept"),
            Err(e) => tracing::warn!(
                error = %e,
                "local member check failed, leaving purge to the sweep"
            ),
        }
        Ok(())
    }

    /// Publish a room-scoped purge right away and wait for the bus to accept it.
    pub async fn purge_room_now(&self, room_id: &RoomId) -> Result<u64, BusError> {
        let notification = PurgeNotification::RoomScopedPurge {
            room_id: room_id.clone(),
        };
        publish_purge(&*self.memberships, &*self.bus, &self.topic, &notification).await
    }

    fn publish_detached(&self, notification: PurgeNotification) {
        let memberships = Arc::clone(&self.memberships);
        let bus = Arc::clone(&self.bus);
        let topic = self.topic.clone();

        let work = async move {
            for attempt in 1..=PUBLISH_ATTEMPTS {
                match publish_purge(&*memberships, &*bus, &topic, &notification).await {
                    Ok(_) => return,
                    Err(BusError::Closed) => {
                        tracing::warn!("bus closed, purge notification not published");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "failed to publish purge notification");
                        if attempt < PUBLISH_ATTEMPTS {
                            tokio::time::sleep(PUBLISH_BACKOFF * attempt).await;
                        }
                    }
                }
            }
        };
        self.tasks
            .spawn("publish_purge", work.instrument(tracing::Span::current()));
    }
}
