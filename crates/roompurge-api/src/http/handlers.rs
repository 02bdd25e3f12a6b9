//! Internal API handlers.
//!
//! POST /api/roomserver/performForget - Forget a room on behalf of a user.

use std::collections::HashMap;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use tracing::Instrument;

use roompurge_core::bus::MessageBus;
use roompurge_types::membership::{PerformForgetRequest, PerformForgetResponse};

use crate::http::error::AppError;
use crate::state::AppState;

/// Trace-context headers forwarded by the caller.
const TRACE_HEADERS: [&str; 2] = ["traceparent", "tracestate"];

fn trace_headers(headers: &HeaderMap) -> HashMap<String, String> {
    TRACE_HEADERS
        .iter()
        .filter_map(|name| {
            let value = headers.get(*name)?.to_str().ok()?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// POST /api/roomserver/performForget
///
/// Marks the membership forgotten and answers once the write and the
/// member check are done. Purge publication happens in the background.
pub async fn perform_forget<B>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
    payload: Result<Json<PerformForgetRequest>, JsonRejection>,
) -> Result<Json<PerformForgetResponse>, AppError>
where
    B: MessageBus + Clone + 'static,
{
    let Json(request) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;

    let span = tracing::info_span!(
        "perform_forget",
        user_id = %request.user_id,
        room_id = %request.room_id,
    );
    roompurge_observe::propagation::set_remote_parent(&span, &trace_headers(&headers));

    state
        .forget_service
        .forget_room(&request.user_id, &request.room_id)
        .instrument(span)
        .await?;

    Ok(Json(PerformForgetResponse {}))
}
