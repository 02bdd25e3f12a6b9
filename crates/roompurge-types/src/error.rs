use thiserror::Error;

use crate::id::{RoomId, UserId};

/// Errors from parsing user and room identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier '{id}' does not start with '{sigil}'")]
    MissingSigil { sigil: char, id: String },

    #[error("identifier '{0}' has no server name")]
    MissingServerName(String),

    #[error("identifier '{0}' has an empty localpart")]
    EmptyLocalpart(String),
}

/// Errors from repository operations (used by trait definitions in roompurge-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The store could not be reached or is temporarily locked.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("query error: {0}")]
    Query(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

impl RepositoryError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_))
    }
}

/// Errors returned by the forget operation.
#[derive(Debug, Error)]
pub enum ForgetError {
    /// The user must leave the room before forgetting it.
    #[error("user {user_id} is still joined to room {room_id}")]
    StillJoined { user_id: UserId, room_id: RoomId },

    #[error("user {user_id} has no membership in room {room_id}")]
    NotMember { user_id: UserId, room_id: RoomId },

    /// The membership write failed. The write is idempotent, so retrying is safe.
    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

impl ForgetError {
    /// Precondition violations are permanent; storage failures are not.
    pub fn is_temporary(&self) -> bool {
        matches!(self, ForgetError::Storage(_))
    }
}

/// Errors from message bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),

    /// The subscription or bus was shut down.
    #[error("bus closed")]
    Closed,

    #[error("malformed bus message: {0}")]
    Malformed(String),
}

impl From<RepositoryError> for BusError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Unavailable(msg) => BusError::Unavailable(msg),
            other => BusError::Malformed(other.to_string()),
        }
    }
}

/// Error returned by an internal (service-to-service) API call.
///
/// Callers branch on two axes only: whether the failure happened on this
/// side or the remote side, and whether retrying may help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalApiError {
    /// The call failed before or while being dispatched, or its response
    /// could not be decoded.
    #[error("internal API call failed: {message}")]
    Call { message: String, temporary: bool },

    /// The remote service answered with a non-success status.
    #[error("internal API {url} returned HTTP {code}: {message}")]
    Remote {
        url: String,
        code: u16,
        message: String,
    },
}

impl InternalApiError {
    /// Whether retrying may succeed. Remote errors are temporary only for 5xx.
    pub fn temporary(&self) -> bool {
        match self {
            InternalApiError::Call { temporary, .. } => *temporary,
            InternalApiError::Remote { code, .. } => *code >= 500,
        }
    }

    pub fn remote(&self) -> bool {
        matches!(self, InternalApiError::Remote { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_transience() {
        assert!(RepositoryError::Unavailable("locked".into()).is_transient());
        assert!(!RepositoryError::Query("syntax error".into()).is_transient());
        assert!(!RepositoryError::InvalidData("bad state".into()).is_transient());
    }

    #[test]
    fn test_forget_error_display() {
        let err = ForgetError::StillJoined {
            user_id: UserId::parse("@a:x").unwrap(),
            room_id: RoomId::parse("!r:x").unwrap(),
        };
        assert_eq!(err.to_string(), "user @a:x is still joined to room !r:x");
        assert!(!err.is_temporary());
        assert!(ForgetError::Storage(RepositoryError::Unavailable("down".into())).is_temporary());
    }

    #[test]
    fn test_internal_api_error_axes() {
        let call = InternalApiError::Call {
            message: "connection refused".into(),
            temporary: true,
        };
        assert!(call.temporary());
        assert!(!call.remote());

        let not_found = InternalApiError::Remote {
            url: "http://h/api/x".into(),
            code: 404,
            message: "unknown error".into(),
        };
        assert!(!not_found.temporary());
        assert!(not_found.remote());

        let unavailable = InternalApiError::Remote {
            url: "http://h/api/x".into(),
            code: 503,
            message: "busy".into(),
        };
        assert!(unavailable.temporary());
        assert_eq!(
            unavailable.to_string(),
            "internal API http://h/api/x returned HTTP 503: busy"
        );
    }
}
