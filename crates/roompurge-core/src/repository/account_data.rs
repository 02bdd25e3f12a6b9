//! Account-data repository trait definition.

use roompurge_types::account_data::{GlobalAccountData, Notification};
use roompurge_types::error::RepositoryError;
use roompurge_types::id::RoomId;

/// Repository trait for the account-data service's notification and
/// account-data tables.
///
/// Every delete returns the number of rows removed; deleting rows that do
/// not exist is a successful no-op returning zero.
pub trait AccountDataRepository: Send + Sync {
    /// Delete notifications for the room across all local users.
    fn delete_notifications_for_room(
        &self,
        room_id: &RoomId,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Delete room-scoped account data for the room across all local users.
    fn delete_account_data_for_room(
        &self,
        room_id: &RoomId,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    fn delete_notifications_for_user(
        &self,
        localpart: &str,
        room_id: &RoomId,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    fn delete_account_data_for_user(
        &self,
        localpart: &str,
        room_id: &RoomId,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// All global (non room-scoped) account data of the user.
    fn global_account_data(
        &self,
        localpart: &str,
    ) -> impl std::future::Future<Output = Result<GlobalAccountData, RepositoryError>> + Send;

    /// Read one document. `room_id = None` selects global account data.
    fn account_data(
        &self,
        localpart: &str,
        room_id: Option<&RoomId>,
        data_type: &str,
    ) -> impl std::future::Future<Output = Result<Option<serde_json::Value>, RepositoryError>> + Send;

    /// Insert or replace one document. `room_id = None` selects global account data.
    fn save_account_data(
        &self,
        localpart: &str,
        room_id: Option<&RoomId>,
        data_type: &str,
        content: &serde_json::Value,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn insert_notification(
        &self,
        notification: &Notification,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Count a user's notifications, optionally limited to one room.
    fn count_notifications(
        &self,
        localpart: &str,
        room_id: Option<&RoomId>,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
