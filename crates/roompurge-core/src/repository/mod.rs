//! Repository trait definitions (ports).
//!
//! The room-state service owns the membership store; the account-data
//! service owns notifications and account data. Neither writes the other's
//! tables. Implementations live in roompurge-infra.

pub mod account_data;
pub mod membership;
