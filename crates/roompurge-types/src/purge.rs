//! The purge notification carried on the room-purge bus topic.
//!
//! The message body is empty; everything lives in headers so that the
//! consumer can route without decoding a payload.

use std::collections::BTreeMap;

use crate::error::IdError;
use crate::id::{RoomId, UserId};

/// Header carrying the room to purge. Required.
pub const ROOM_ID_HEADER: &str = "room_id";

/// Header carrying the forgetting user. Its presence selects user-scoped cleanup.
pub const USER_ID_HEADER: &str = "user_id";

/// Bus message headers.
pub type Headers = BTreeMap<String, String>;

/// A purge instruction for the account-data service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeNotification {
    /// No local member remains: drop every local artifact of the room.
    RoomScopedPurge { room_id: RoomId },
    /// One user forgot the room: drop that user's artifacts and prune
    /// references to the room from their global account data.
    UserScopedCleanup { user_id: UserId, room_id: RoomId },
}

impl PurgeNotification {
    pub fn room_id(&self) -> &RoomId {
        match self {
            PurgeNotification::RoomScopedPurge { room_id }
            | PurgeNotification::UserScopedCleanup { room_id, .. } => room_id,
        }
    }

    pub fn to_headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.insert(ROOM_ID_HEADER.to_string(), self.room_id().to_string());
        if let PurgeNotification::UserScopedCleanup { user_id, .. } = self {
            headers.insert(USER_ID_HEADER.to_string(), user_id.to_string());
        }
        headers
    }

    /// Decode a notification from bus headers.
    ///
    /// Returns `Ok(None)` when there is nothing to act on (no room id and no
    /// user id). A populated but malformed id is an error.
    pub fn from_headers(headers: &Headers) -> Result<Option<Self>, IdError> {
        let room_id = header(headers, ROOM_ID_HEADER);
        let user_id = header(headers, USER_ID_HEADER);

        match (user_id, room_id) {
            (None, None) => Ok(None),
            (Some(user_id), room_id) => Ok(Some(PurgeNotification::UserScopedCleanup {
                user_id: UserId::parse(user_id)?,
                room_id: RoomId::parse(room_id.unwrap_or_default())?,
            })),
            (None, Some(room_id)) => Ok(Some(PurgeNotification::RoomScopedPurge {
                room_id: RoomId::parse(room_id)?,
            })),
        }
    }
}

fn header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn room_scoped_headers() {
        let msg = PurgeNotification::RoomScopedPurge {
            room_id: RoomId::parse("!r:x").unwrap(),
        };
        let h = msg.to_headers();
        assert_eq!(h.get(ROOM_ID_HEADER).map(String::as_str), Some("!r:x"));
        assert!(!h.contains_key(USER_ID_HEADER));
        assert_eq!(PurgeNotification::from_headers(&h).unwrap(), Some(msg));
    }

    #[test]
    fn user_id_header_selects_user_scoped_cleanup() {
        let h = headers(&[(ROOM_ID_HEADER, "!r:x"), (USER_ID_HEADER, "@a:x")]);
        let msg = PurgeNotification::from_headers(&h).unwrap().unwrap();
        assert!(matches!(msg, PurgeNotification::UserScopedCleanup { .. }));
        assert_eq!(msg.room_id().as_str(), "!r:x");
    }

    #[test]
    fn empty_headers_are_ignored() {
        assert_eq!(PurgeNotification::from_headers(&Headers::new()).unwrap(), None);
        let h = headers(&[(ROOM_ID_HEADER, ""), (USER_ID_HEADER, "")]);
        assert_eq!(PurgeNotification::from_headers(&h).unwrap(), None);
    }

    #[test]
    fn malformed_ids_are_errors() {
        let h = headers(&[(ROOM_ID_HEADER, "not-a-room")]);
        assert!(PurgeNotification::from_headers(&h).is_err());
        let h = headers(&[(ROOM_ID_HEADER, "!r:x"), (USER_ID_HEADER, "nobody")]);
        assert!(PurgeNotification::from_headers(&h).is_err());
        let h = headers(&[(USER_ID_HEADER, "@a:x")]);
        assert!(PurgeNotification::from_headers(&h).is_err());
    }
}
