//! Shared domain types for the room forget/purge subsystem.
//!
//! Identifiers, membership states, the purge bus message, account-data
//! document keys, configuration, and the error types used by every other
//! crate in the workspace.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod account_data;
pub mod config;
pub mod error;
pub mod id;
pub mod membership;
pub mod purge;
