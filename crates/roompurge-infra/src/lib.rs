//! Infrastructure layer for roompurge.
//!
//! Contains implementations of the ports defined in `roompurge-core`:
//! SQLite membership and account-data stores, the SQLite durable message
//! bus, the internal HTTP RPC client, and the configuration loader.

pub mod config;
pub mod rpc;
pub mod sqlite;
