//! SQLite account-data repository implementation.
//!
//! Implements `AccountDataRepository` from `roompurge-core`. Documents are
//! stored as JSON text; global account data uses an empty `room_id`.

use chrono::Utc;
use roompurge_core::repository::account_data::AccountDataRepository;
use roompurge_types::account_data::{GlobalAccountData, Notification};
use roompurge_types::error::RepositoryError;
use roompurge_types::id::RoomId;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{db_error, format_datetime};

/// Stored `room_id` of global account data.
const GLOBAL_ROOM: &str = "";

/// SQLite-backed implementation of `AccountDataRepository`.
pub struct SqliteAccountDataRepository {
    pool: DatabasePool,
}

impl SqliteAccountDataRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn room_key(room_id: Option<&RoomId>) -> &str {
    room_id.map(RoomId::as_str).unwrap_or(GLOBAL_ROOM)
}

fn parse_content(raw: &str) -> Result<serde_json::Value, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|e| RepositoryError::InvalidData(format!("invalid JSON content: {e}")))
}

impl AccountDataRepository for SqliteAccountDataRepository {
    async fn delete_notifications_for_room(&self, room_id: &RoomId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM notifications WHERE room_id = ?")
            .bind(room_id.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_account_data_for_room(&self, room_id: &RoomId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM account_data WHERE room_id = ?")
            .bind(room_id.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_notifications_for_user(
        &self,
        localpart: &str,
        room_id: &RoomId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM notifications WHERE localpart = ? AND room_id = ?")
            .bind(localpart)
            .bind(room_id.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_account_data_for_user(
        &self,
        localpart: &str,
        room_id: &RoomId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM account_data WHERE localpart = ? AND room_id = ?")
            .bind(localpart)
            .bind(room_id.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn global_account_data(&self, localpart: &str) -> Result<GlobalAccountData, RepositoryError> {
        let rows = sqlx::query(
            "SELECT data_type, content FROM account_data WHERE localpart = ? AND room_id = ?",
        )
        .bind(localpart)
        .bind(GLOBAL_ROOM)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(db_error)?;

        let mut global = GlobalAccountData::with_capacity(rows.len());
        for row in &rows {
            let data_type: String = row.try_get("data_type").map_err(db_error)?;
            let content: String = row.try_get("content").map_err(db_error)?;
            global.insert(data_type, parse_content(&content)?);
        }
        Ok(global)
    }

    async fn account_data(
        &self,
        localpart: &str,
        room_id: Option<&RoomId>,
        data_type: &str,
    ) -> Result<Option<serde_json::Value>, RepositoryError> {
        let content: Option<String> = sqlx::query_scalar(
            "SELECT content FROM account_data WHERE localpart = ? AND room_id = ? AND data_type = ?",
        )
        .bind(localpart)
        .bind(room_key(room_id))
        .bind(data_type)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(db_error)?;

        content.as_deref().map(parse_content).transpose()
    }

    async fn save_account_data(
        &self,
        localpart: &str,
        room_id: Option<&RoomId>,
        data_type: &str,
        content: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());
        let content = serde_json::to_string(content)
            .map_err(|e| RepositoryError::Query(format!("failed to serialize content: {e}")))?;

        sqlx::query(
            r#"INSERT INTO account_data (localpart, room_id, data_type, content, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (localpart, room_id, data_type) DO UPDATE SET
                   content = excluded.content,
                   updated_at = excluded.updated_at"#,
        )
        .bind(localpart)
        .bind(room_key(room_id))
        .bind(data_type)
        .bind(&content)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO notifications (localpart, room_id, event_id, highlight, read, created_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT (localpart, room_id, event_id) DO NOTHING"#,
        )
        .bind(&notification.localpart)
        .bind(notification.room_id.as_str())
        .bind(&notification.event_id)
        .bind(notification.highlight)
        .bind(notification.read)
        .bind(format_datetime(&notification.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn count_notifications(
        &self,
        localpart: &str,
        room_id: Option<&RoomId>,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = match room_id {
            Some(room_id) => sqlx::query_scalar(
                "SELECT COUNT(*) FROM notifications WHERE localpart = ? AND room_id = ?",
            )
            .bind(localpart)
            .bind(room_id.as_str())
            .fetch_one(&self.pool.reader)
            .await
            .map_err(db_error)?,
            None => sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE localpart = ?")
                .bind(localpart)
                .fetch_one(&self.pool.reader)
                .await
                .map_err(db_error)?,
        };

        Ok(count as u64)
    }
}
