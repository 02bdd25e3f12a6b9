//! Account-data and notification types owned by the account-data service.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::RoomId;

/// Account-data type of the push-rule document.
pub const PUSH_RULES: &str = "m.push_rules";

/// Account-data type of the direct-message room map.
pub const DIRECT: &str = "m.direct";

/// Global (not room-scoped) account data of one user, keyed by data type.
pub type GlobalAccountData = HashMap<String, serde_json::Value>;

/// A push notification stored for a local user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub localpart: String,
    pub room_id: RoomId,
    pub event_id: String,
    pub highlight: bool,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
