//! Internal HTTP API of the room-state service.
//!
//! JSON POST routes under `/api/`, consumed by sibling services through
//! `roompurge_infra::rpc`.

pub mod error;
pub mod handlers;
pub mod router;
