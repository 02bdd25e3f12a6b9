//! Observability for roompurge: tracing subscriber setup and W3C trace
//! context propagation across internal RPC calls.

pub mod propagation;
pub mod tracing_setup;
