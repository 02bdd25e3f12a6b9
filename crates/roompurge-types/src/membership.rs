use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::id::{RoomId, UserId};

/// Membership of one user in one room, as seen by this server.
///
/// - Joined: currently in the room
/// - Left: no longer in the room, but the room still shows in their room list
/// - Forgotten: left and explicitly hidden; only reachable from `Left`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipState {
    Joined,
    Left,
    Forgotten,
}

impl MembershipState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipState::Joined => "joined",
            MembershipState::Left => "left",
            MembershipState::Forgotten => "forgotten",
        }
    }
}

impl fmt::Display for MembershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "joined" => Ok(MembershipState::Joined),
            "left" => Ok(MembershipState::Left),
            "forgotten" => Ok(MembershipState::Forgotten),
            other => Err(format!("invalid membership state: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub state: MembershipState,
    /// Whether the user is hosted by this server.
    pub local: bool,
    pub updated_at: DateTime<Utc>,
}

/// Result of attempting the `Left -> Forgotten` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgetTransition {
    /// The membership moved from `Left` to `Forgotten`.
    Forgotten,
    /// It was already `Forgotten`; nothing changed.
    AlreadyForgotten,
    /// The user is still joined; nothing changed.
    StillJoined,
    /// No membership exists for this user and room.
    NotMember,
}

/// Request body of the forget operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformForgetRequest {
    pub user_id: UserId,
    pub room_id: RoomId,
}

/// Empty response body of the forget operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformForgetResponse {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_state_parse_and_display() {
        for state in [
            MembershipState::Joined,
            MembershipState::Left,
            MembershipState::Forgotten,
        ] {
            assert_eq!(state.to_string().parse::<MembershipState>(), Ok(state));
        }
        assert!("banned".parse::<MembershipState>().is_err());
    }

    #[test]
    fn forget_request_wire_shape() {
        let req: PerformForgetRequest =
            serde_json::from_str(r#"{"user_id":"@a:x","room_id":"!r:x"}"#).unwrap();
        assert_eq!(req.user_id.localpart(), "a");
        let resp = serde_json::to_string(&PerformForgetResponse::default()).unwrap();
        assert_eq!(resp, "{}");
    }
}
