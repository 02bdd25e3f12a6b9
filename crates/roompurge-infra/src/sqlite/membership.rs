//! SQLite membership repository implementation.
//!
//! Implements `MembershipRepository` from `roompurge-core` using sqlx with
//! split read/write pools. The `Left -> Forgotten` transition runs in a
//! single writer transaction.

use chrono::Utc;
use roompurge_core::repository::membership::MembershipRepository;
use roompurge_types::error::RepositoryError;
use roompurge_types::id::{RoomId, UserId};
use roompurge_types::membership::{ForgetTransition, Membership, MembershipState};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{db_error, format_datetime, parse_datetime};

/// SQLite-backed implementation of `MembershipRepository`.
pub struct SqliteMembershipRepository {
    pool: DatabasePool,
}

impl SqliteMembershipRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct MembershipRow {
    user_id: String,
    room_id: String,
    state: String,
    local: bool,
    updated_at: String,
}

impl MembershipRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            room_id: row.try_get("room_id")?,
            state: row.try_get("state")?,
            local: row.try_get("local")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_membership(self) -> Result<Membership, RepositoryError> {
        let user_id = UserId::parse(self.user_id)
            .map_err(|e| RepositoryError::InvalidData(format!("invalid user_id: {e}")))?;
        let room_id = RoomId::parse(self.room_id)
            .map_err(|e| RepositoryError::InvalidData(format!("invalid room_id: {e}")))?;
        let state = self
            .state
            .parse::<MembershipState>()
            .map_err(RepositoryError::InvalidData)?;

        Ok(Membership {
            user_id,
            room_id,
            state,
            local: self.local,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// MembershipRepository implementation
// ---------------------------------------------------------------------------

impl MembershipRepository for SqliteMembershipRepository {
    async fn record_membership(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        state: MembershipState,
        local: bool,
    ) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());
        let forgotten_at = (state == MembershipState::Forgotten).then(|| now.clone());

        sqlx::query(
            r#"INSERT INTO memberships (user_id, room_id, state, local, forgotten_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT (user_id, room_id) DO UPDATE SET
                   state = excluded.state,
                   local = excluded.local,
                   forgotten_at = excluded.forgotten_at,
                   updated_at = excluded.updated_at"#,
        )
        .bind(user_id.as_str())
        .bind(room_id.as_str())
        .bind(state.as_str())
        .bind(local)
        .bind(forgotten_at)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn membership(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> Result<Option<Membership>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, room_id, state, local, updated_at FROM memberships WHERE user_id = ? AND room_id = ?",
        )
        .bind(user_id.as_str())
        .bind(room_id.as_str())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(db_error)?;

        match row {
            Some(row) => {
                let membership_row = MembershipRow::from_row(&row).map_err(db_error)?;
                Ok(Some(membership_row.into_membership()?))
            }
            None => Ok(None),
        }
    }

    async fn forget(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> Result<ForgetTransition, RepositoryError> {
        let now = format_datetime(&Utc::now());
        let mut tx = self.pool.writer.begin().await.map_err(db_error)?;

        let state: Option<String> =
            sqlx::query_scalar("SELECT state FROM memberships WHERE user_id = ? AND room_id = ?")
                .bind(user_id.as_str())
                .bind(room_id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?;

        let Some(state) = state else {
            return Ok(ForgetTransition::NotMember);
        };
        let transition = match state
            .parse::<MembershipState>()
            .map_err(RepositoryError::InvalidData)?
        {
            MembershipState::Joined => ForgetTransition::StillJoined,
            MembershipState::Forgotten => ForgetTransition::AlreadyForgotten,
            MembershipState::Left => {
                sqlx::query(
                    r#"UPDATE memberships
                       SET state = 'forgotten', forgotten_at = ?, updated_at = ?
                       WHERE user_id = ? AND room_id = ? AND state = 'left'"#,
                )
                .bind(&now)
                .bind(&now)
                .bind(user_id.as_str())
                .bind(room_id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
                ForgetTransition::Forgotten
            }
        };

        tx.commit().await.map_err(db_error)?;
        Ok(transition)
    }

    async fn joined_local_members(&self, room_id: &RoomId) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM memberships WHERE room_id = ? AND local = 1 AND state = 'joined'",
        )
        .bind(room_id.as_str())
        .fetch_one(&self.pool.reader)
        .await
        .map_err(db_error)?;

        Ok(count as u64)
    }

    async fn record_purge_published(&self, room_id: &RoomId) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());

        sqlx::query(
            r#"INSERT INTO room_purges (room_id, published_at, publications)
               VALUES (?, ?, 1)
               ON CONFLICT (room_id) DO UPDATE SET
                   published_at = excluded.published_at,
                   publications = publications + 1"#,
        )
        .bind(room_id.as_str())
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn rooms_pending_purge(&self, limit: u32) -> Result<Vec<RoomId>, RepositoryError> {
        let rows: Vec<String> = sqlx::query_scalar(
            r#"SELECT DISTINCT m.room_id
               FROM memberships m
               LEFT JOIN room_purges p ON p.room_id = m.room_id
               WHERE m.local = 1
                 AND m.state = 'forgotten'
                 AND (p.published_at IS NULL OR m.forgotten_at > p.published_at)
                 AND NOT EXISTS (
                     SELECT 1 FROM memberships j
                     WHERE j.room_id = m.room_id AND j.local = 1 AND j.state = 'joined'
                 )
               ORDER BY m.room_id
               LIMIT ?"#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|room_id| {
                RoomId::parse(room_id)
                    .map_err(|e| RepositoryError::InvalidData(format!("invalid room_id: {e}")))
            })
            .collect()
    }
}
