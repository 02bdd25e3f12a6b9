//! Membership repository trait definition.

use roompurge_types::error::RepositoryError;
use roompurge_types::id::{RoomId, UserId};
use roompurge_types::membership::{ForgetTransition, Membership, MembershipState};

/// Repository trait for the room-state service's membership table.
///
/// Implementations live in roompurge-infra (e.g., SqliteMembershipRepository).
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait MembershipRepository: Send + Sync {
    /// Record a membership change computed by the room-state engine.
    ///
    /// Moving to `Joined` or `Left` always succeeds and clears any previous
    /// `Forgotten` marker.
    fn record_membership(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        state: MembershipState,
        local: bool,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn membership(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> impl std::future::Future<Output = Result<Option<Membership>, RepositoryError>> + Send;

    /// Atomically move a `Left` membership to `Forgotten`.
    ///
    /// Never changes a `Joined` membership; reports why through the
    /// returned transition instead.
    fn forget(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> impl std::future::Future<Output = Result<ForgetTransition, RepositoryError>> + Send;

    /// Number of local users currently joined to the room.
    fn joined_local_members(
        &self,
        room_id: &RoomId,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Remember that a room-scoped purge was published for the room.
    fn record_purge_published(
        &self,
        room_id: &RoomId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Rooms with no joined local member where a local user forgot the room
    /// after the last recorded purge publication (or no purge was ever
    /// recorded).
    fn rooms_pending_purge(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<RoomId>, RepositoryError>> + Send;
}
