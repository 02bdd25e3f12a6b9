//! Business logic and port definitions for the room forget/purge subsystem.
//!
//! This crate defines the repository and message-bus traits that the
//! infrastructure layer implements, plus the services built on them. It
//! depends only on `roompurge-types` -- never on `roompurge-infra` or any
//! database/IO crate.

pub mod bus;
pub mod prune;
pub mod repository;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;
