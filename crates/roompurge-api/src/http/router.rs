//! Axum router configuration with middleware.
//!
//! Routes live under `/api/`; the tracing layer logs every request.

use axum::Router;
use axum::routing::post;
use tower_http::trace::TraceLayer;

use roompurge_core::bus::MessageBus;
use roompurge_infra::rpc::PERFORM_FORGET_PATH;

use crate::http::handlers;
use crate::state::AppState;

/// Build the internal API router.
pub fn build_router<B>(state: AppState<B>) -> Router
where
    B: MessageBus + Clone + 'static,
{
    Router::new()
        .route(PERFORM_FORGET_PATH, post(handlers::perform_forget::<B>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
