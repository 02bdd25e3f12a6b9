//! Matrix-style identifiers: `@localpart:server` users, `!opaque:server` rooms.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::error::IdError;

/// Split a sigil-prefixed identifier into `(localpart, server)`.
///
/// The server part is everything after the first `:`, so ports survive
/// (`@alice:example.org:8448` -> `("alice", "example.org:8448")`).
pub fn split_id(sigil: char, id: &str) -> Result<(&str, &str), IdError> {
    let rest = id
        .strip_prefix(sigil)
        .ok_or_else(|| IdError::MissingSigil { sigil, id: id.to_string() })?;
    rest.split_once(':')
        .ok_or_else(|| IdError::MissingServerName(id.to_string()))
}

/// The name of a homeserver (`example.org`, `example.org:8448`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerName(String);

impl ServerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully-qualified user identifier, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn parse(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        let (localpart, server) = split_id('@', &id)?;
        if localpart.is_empty() {
            return Err(IdError::EmptyLocalpart(id));
        }
        if server.is_empty() {
            return Err(IdError::MissingServerName(id));
        }
        Ok(Self(id))
    }

    /// The part between the sigil and the first `:`.
    pub fn localpart(&self) -> &str {
        // Validated in `parse`.
        self.0[1..].split_once(':').map(|(l, _)| l).unwrap_or_default()
    }

    pub fn server_name(&self) -> &str {
        self.0[1..].split_once(':').map(|(_, s)| s).unwrap_or_default()
    }

    /// Whether this user is hosted by `server`.
    pub fn is_local(&self, server: &ServerName) -> bool {
        self.server_name() == server.as_str()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// An opaque room identifier.
///
/// Only the `!` sigil is checked; the rest of the id is never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn parse(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.len() < 2 || !id.starts_with('!') {
            return Err(IdError::MissingSigil { sigil: '!', id });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}
