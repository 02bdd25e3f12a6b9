//! SQLite storage layer.
//!
//! Repository and bus implementations backed by SQLite with WAL mode and
//! split read/write connection pools.

pub mod account_data;
pub mod bus;
pub mod membership;
pub mod pool;

use chrono::{DateTime, SecondsFormat, Utc};
use roompurge_types::error::RepositoryError;

/// SQLITE_BUSY and SQLITE_LOCKED primary result codes.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Map a sqlx error to a repository error, keeping lock contention and
/// connection loss distinguishable as transient.
pub(crate) fn db_error(e: sqlx::Error) -> RepositoryError {
    let transient = match &e {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
        _ => false,
    };

    if transient {
        RepositoryError::Unavailable(e.to_string())
    } else {
        RepositoryError::Query(e.to_string())
    }
}

/// Fixed-width RFC 3339 so stored timestamps compare lexically.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::InvalidData(format!("invalid datetime: {e}")))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> pool::DatabasePool {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    std::mem::forget(dir);
    pool::DatabasePool::new(&url).await.unwrap()
}
