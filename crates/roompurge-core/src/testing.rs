//! In-memory repository doubles with failure injection for service tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use roompurge_types::account_data::{GlobalAccountData, Notification};
use roompurge_types::error::RepositoryError;
use roompurge_types::id::{RoomId, UserId};
use roompurge_types::membership::{ForgetTransition, Membership, MembershipState};
use serde_json::Value;

use crate::repository::account_data::AccountDataRepository;
use crate::repository::membership::MembershipRepository;

fn check(flag: &AtomicBool) -> Result<(), RepositoryError> {
    if flag.load(Ordering::SeqCst) {
        Err(RepositoryError::Unavailable("injected outage".into()))
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Memberships
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MembershipTables {
    rows: HashMap<(UserId, RoomId), Membership>,
    /// Logical clock of the latest local forget, per room.
    forgotten_at: HashMap<RoomId, u64>,
    /// Logical clock of the latest recorded purge, per room.
    purged_at: HashMap<RoomId, u64>,
    purges_recorded: HashMap<RoomId, usize>,
    clock: u64,
}

#[derive(Default)]
pub struct MemoryMembershipRepository {
    tables: Mutex<MembershipTables>,
    /// Every operation fails with a transient error.
    pub unavailable: AtomicBool,
    /// Only `joined_local_members` fails.
    pub fail_member_check: AtomicBool,
}

impl MemoryMembershipRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, user: &str, room: &str) {
        self.set(user, room, MembershipState::Joined).await;
    }

    pub async fn leave(&self, user: &str, room: &str) {
        self.set(user, room, MembershipState::Left).await;
    }

    async fn set(&self, user: &str, room: &str, state: MembershipState) {
        let user_id = UserId::parse(user).unwrap();
        let room_id = RoomId::parse(room).unwrap();
        let local = user_id.server_name() == "local";
        self.record_membership(&user_id, &room_id, state, local)
            .await
            .unwrap();
    }

    pub fn state_of(&self, user: &str, room: &str) -> Option<MembershipState> {
        let key = (UserId::parse(user).unwrap(), RoomId::parse(room).unwrap());
        self.tables.lock().unwrap().rows.get(&key).map(|m| m.state)
    }

    pub fn purges_recorded(&self, room: &str) -> usize {
        let room_id = RoomId::parse(room).unwrap();
        self.tables
            .lock()
            .unwrap()
            .purges_recorded
            .get(&room_id)
            .copied()
            .unwrap_or(0)
    }
}

impl MembershipRepository for MemoryMembershipRepository {
    async fn record_membership(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        state: MembershipState,
        local: bool,
    ) -> Result<(), RepositoryError> {
        check(&self.unavailable)?;
        let mut tables = self.tables.lock().unwrap();
        tables.rows.insert(
            (user_id.clone(), room_id.clone()),
            Membership {
                user_id: user_id.clone(),
                room_id: room_id.clone(),
                state,
                local,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn membership(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> Result<Option<Membership>, RepositoryError> {
        check(&self.unavailable)?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.rows.get(&(user_id.clone(), room_id.clone())).cloned())
    }

    async fn forget(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> Result<ForgetTransition, RepositoryError> {
        check(&self.unavailable)?;
        let mut tables = self.tables.lock().unwrap();
        tables.clock += 1;
        let now = tables.clock;

        let Some(row) = tables.rows.get_mut(&(user_id.clone(), room_id.clone())) else {
            return Ok(ForgetTransition::NotMember);
        };
        let local = row.local;
        let transition = match row.state {
            MembershipState::Joined => return Ok(ForgetTransition::StillJoined),
            MembershipState::Forgotten => ForgetTransition::AlreadyForgotten,
            MembershipState::Left => {
                row.state = MembershipState::Forgotten;
                row.updated_at = Utc::now();
                ForgetTransition::Forgotten
            }
        };
        if transition == ForgetTransition::Forgotten && local {
            tables.forgotten_at.insert(room_id.clone(), now);
        }
        Ok(transition)
    }

    async fn joined_local_members(&self, room_id: &RoomId) -> Result<u64, RepositoryError> {
        check(&self.unavailable)?;
        check(&self.fail_member_check)?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .rows
            .values()
            .filter(|m| &m.room_id == room_id && m.local && m.state == MembershipState::Joined)
            .count() as u64)
    }

    async fn record_purge_published(&self, room_id: &RoomId) -> Result<(), RepositoryError> {
        check(&self.unavailable)?;
        let mut tables = self.tables.lock().unwrap();
        tables.clock += 1;
        let now = tables.clock;
        tables.purged_at.insert(room_id.clone(), now);
        *tables.purges_recorded.entry(room_id.clone()).or_default() += 1;
        Ok(())
    }

    async fn rooms_pending_purge(&self, limit: u32) -> Result<Vec<RoomId>, RepositoryError> {
        check(&self.unavailable)?;
        let tables = self.tables.lock().unwrap();
        let mut rooms: Vec<RoomId> = tables
            .forgotten_at
            .iter()
            .filter(|(room, forgotten)| {
                tables.purged_at.get(*room).is_none_or(|purged| purged < *forgotten)
            })
            .filter(|(room, _)| {
                !tables.rows.values().any(|m| {
                    &m.room_id == *room && m.local && m.state == MembershipState::Joined
                })
            })
            .map(|(room, _)| room.clone())
            .collect();
        rooms.sort();
        rooms.truncate(limit as usize);
        Ok(rooms)
    }
}

// ---------------------------------------------------------------------------
// Account data
// ---------------------------------------------------------------------------

type AccountDataKey = (String, Option<RoomId>, String);

#[derive(Default)]
pub struct MemoryAccountDataRepository {
    notifications: Mutex<Vec<Notification>>,
    documents: Mutex<HashMap<AccountDataKey, Value>>,
    /// Every operation fails with a transient error.
    pub unavailable: AtomicBool,
    /// Notification deletes fail with a transient error.
    pub fail_notifications: AtomicBool,
    /// Notification deletes fail with a permanent error.
    pub corrupt_notifications: AtomicBool,
    /// Number of `save_account_data` calls.
    pub saves: AtomicUsize,
}

impl MemoryAccountDataRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notify(&self, localpart: &str, room: &str, event_id: &str) {
        self.insert_notification(&Notification {
            localpart: localpart.to_string(),
            room_id: RoomId::parse(room).unwrap(),
            event_id: event_id.to_string(),
            highlight: false,
            read: false,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    }

    pub fn put(&self, localpart: &str, room: Option<&str>, data_type: &str, content: Value) {
        let room = room.map(|r| RoomId::parse(r).unwrap());
        self.documents
            .lock()
            .unwrap()
            .insert((localpart.to_string(), room, data_type.to_string()), content);
    }

    pub fn get(&self, localpart: &str, room: Option<&str>, data_type: &str) -> Option<Value> {
        let room = room.map(|r| RoomId::parse(r).unwrap());
        self.documents
            .lock()
            .unwrap()
            .get(&(localpart.to_string(), room, data_type.to_string()))
            .cloned()
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }

    pub fn document_count(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    fn check_notifications(&self) -> Result<(), RepositoryError> {
        check(&self.unavailable)?;
        check(&self.fail_notifications)?;
        if self.corrupt_notifications.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("no such table: notifications".into()));
        }
        Ok(())
    }
}

impl AccountDataRepository for MemoryAccountDataRepository {
    async fn delete_notifications_for_room(&self, room_id: &RoomId) -> Result<u64, RepositoryError> {
        self.check_notifications()?;
        let mut rows = self.notifications.lock().unwrap();
        let before = rows.len();
        rows.retain(|n| &n.room_id != room_id);
        Ok((before - rows.len()) as u64)
    }

    async fn delete_account_data_for_room(&self, room_id: &RoomId) -> Result<u64, RepositoryError> {
        check(&self.unavailable)?;
        let mut docs = self.documents.lock().unwrap();
        let before = docs.len();
        docs.retain(|(_, room, _), _| room.as_ref() != Some(room_id));
        Ok((before - docs.len()) as u64)
    }

    async fn delete_notifications_for_user(
        &self,
        localpart: &str,
        room_id: &RoomId,
    ) -> Result<u64, RepositoryError> {
        self.check_notifications()?;
        let mut rows = self.notifications.lock().unwrap();
        let before = rows.len();
        rows.retain(|n| !(n.localpart == localpart && &n.room_id == room_id));
        Ok((before - rows.len()) as u64)
    }

    async fn delete_account_data_for_user(
        &self,
        localpart: &str,
        room_id: &RoomId,
    ) -> Result<u64, RepositoryError> {
        check(&self.unavailable)?;
        let mut docs = self.documents.lock().unwrap();
        let before = docs.len();
        docs.retain(|(owner, room, _), _| !(owner == localpart && room.as_ref() == Some(room_id)));
        Ok((before - docs.len()) as u64)
    }

    async fn global_account_data(&self, localpart: &str) -> Result<GlobalAccountData, RepositoryError> {
        check(&self.unavailable)?;
        let docs = self.documents.lock().unwrap();
        Ok(docs
            .iter()
            .filter(|((owner, room, _), _)| owner == localpart && room.is_none())
            .map(|((_, _, data_type), content)| (data_type.clone(), content.clone()))
            .collect())
    }

    async fn account_data(
        &self,
        localpart: &str,
        room_id: Option<&RoomId>,
        data_type: &str,
    ) -> Result<Option<Value>, RepositoryError> {
        check(&self.unavailable)?;
        let docs = self.documents.lock().unwrap();
        Ok(docs
            .get(&(localpart.to_string(), room_id.cloned(), data_type.to_string()))
            .cloned())
    }

    async fn save_account_data(
        &self,
        localpart: &str,
        room_id: Option<&RoomId>,
        data_type: &str,
        content: &Value,
    ) -> Result<(), RepositoryError> {
        check(&self.unavailable)?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.documents.lock().unwrap().insert(
            (localpart.to_string(), room_id.cloned(), data_type.to_string()),
            content.clone(),
        );
        Ok(())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<(), RepositoryError> {
        check(&self.unavailable)?;
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn count_notifications(
        &self,
        localpart: &str,
        room_id: Option<&RoomId>,
    ) -> Result<u64, RepositoryError> {
        check(&self.unavailable)?;
        let rows = self.notifications.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|n| n.localpart == localpart && room_id.is_none_or(|r| &n.room_id == r))
            .count() as u64)
    }
}
