//! Application error type mapping to HTTP status codes.
//!
//! Error bodies are `{"message": "..."}`, the shape the internal RPC
//! client decodes into `InternalApiError::Remote`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use roompurge_infra::rpc::ErrorBody;
use roompurge_types::error::ForgetError;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Forget precondition or storage failure.
    Forget(ForgetError),
    /// Request body did not parse or carried invalid identifiers.
    Validation(String),
}

impl From<ForgetError> for AppError {
    fn from(e: ForgetError) -> Self {
        AppError::Forget(e)
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Forget(ForgetError::StillJoined { .. }) => StatusCode::CONFLICT,
            AppError::Forget(ForgetError::NotMember { .. }) => StatusCode::FORBIDDEN,
            // 5xx tells the caller the forget may be retried.
            AppError::Forget(ForgetError::Storage(e)) if e.is_transient() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Forget(ForgetError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Forget(e) => e.to_string(),
            AppError::Validation(msg) => msg,
        };

        if status.is_server_error() {
            tracing::error!(%status, %message, "internal API request failed");
        }

        (status, Json(ErrorBody { message })).into_response()
    }
}
