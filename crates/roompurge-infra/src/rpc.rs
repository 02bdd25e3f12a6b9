//! Internal (service-to-service) RPC client over HTTP.
//!
//! Every call is a JSON POST under [`INTERNAL_PATH_PREFIX`] bounded by a
//! deadline. Failures are folded into [`InternalApiError`]:
//!
//! | failure                              | variant  | temporary |
//! |--------------------------------------|----------|-----------|
//! | serialize request / bad URL          | `Call`   | no        |
//! | connect, send, timeout               | `Call`   | yes       |
//! | undecodable success body             | `Call`   | no        |
//! | non-200 status                       | `Remote` | iff 5xx   |

use std::time::Duration;

use reqwest::{Client, Url};
use roompurge_types::config::InternalApiConfig;
use roompurge_types::error::InternalApiError;
use roompurge_types::membership::{PerformForgetRequest, PerformForgetResponse};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Prefix of every internal API path.
pub const INTERNAL_PATH_PREFIX: &str = "/api/";

/// Route of the forget operation on the room-state service.
pub const PERFORM_FORGET_PATH: &str = "/api/roomserver/performForget";

/// Error body of a failed internal call.
#[derive(Debug, Serialize, serde::Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

fn call_error(message: impl Into<String>, temporary: bool) -> InternalApiError {
    InternalApiError::Call {
        message: message.into(),
        temporary,
    }
}

/// Whether a transport error happened while dispatching the request.
fn is_dispatch_failure(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request()
}

/// JSON-over-HTTP client for one sibling service.
#[derive(Debug, Clone)]
pub struct InternalApiClient {
    http: Client,
    base_url: Url,
    timeout: Duration,
}

impl InternalApiClient {
    pub fn new(config: &InternalApiConfig) -> Result<Self, InternalApiError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| call_error(format!("invalid base URL {}: {e}", config.base_url), false))?;
        let http = Client::builder()
            .build()
            .map_err(|e| call_error(format!("failed to build HTTP client: {e}"), false))?;

        Ok(Self {
            http,
            base_url,
            timeout: config.timeout(),
        })
    }

    /// POST `request` to `path` with the configured deadline.
    pub async fn post_json<Req, Res>(&self, path: &str, request: &Req) -> Result<Res, InternalApiError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.call(path, request, self.timeout).await
    }

    /// POST `request` to `path`, failing with a temporary error once
    /// `deadline` has elapsed.
    pub async fn call<Req, Res>(
        &self,
        path: &str,
        request: &Req,
        deadline: Duration,
    ) -> Result<Res, InternalApiError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        if !path.starts_with(INTERNAL_PATH_PREFIX) {
            return Err(call_error(
                format!("path {path} is not under {INTERNAL_PATH_PREFIX}"),
                false,
            ));
        }
        let url = self
            .base_url
            .join(path)
            .map_err(|e| call_error(format!("invalid URL for {path}: {e}"), false))?;
        let body = serde_json::to_vec(request)
            .map_err(|e| call_error(format!("failed to serialize request: {e}"), false))?;

        let mut builder = self
            .http
            .post(url.clone())
            .timeout(deadline)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        for (name, value) in roompurge_observe::propagation::inject_current() {
            builder = builder.header(name, value);
        }

        tracing::debug!(%url, "internal API call");
        let response = builder
            .send()
            .await
            .map_err(|e| call_error(e.to_string(), is_dispatch_failure(&e)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| call_error(format!("failed to read response: {e}"), e.is_timeout()))?;

        if status != reqwest::StatusCode::OK {
            let message = serde_json::from_slice::<ErrorBody>(&bytes)
                .map(|body| body.message)
                .unwrap_or_else(|_| {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                });
            return Err(InternalApiError::Remote {
                url: url.to_string(),
                code: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| call_error(format!("failed to decode response: {e}"), false))
    }
}

/// Client for the room-state service's internal API.
#[derive(Debug, Clone)]
pub struct RoomserverClient {
    api: InternalApiClient,
}

impl RoomserverClient {
    pub fn new(config: &InternalApiConfig) -> Result<Self, InternalApiError> {
        Ok(Self {
            api: InternalApiClient::new(config)?,
        })
    }

    /// Forget a room on behalf of a user.
    ///
    /// Forget is idempotent, so a temporary error may be retried.
    #[tracing::instrument(skip_all, fields(user_id = %request.user_id, room_id = %request.room_id))]
    pub async fn perform_forget(
        &self,
        request: &PerformForgetRequest,
    ) -> Result<PerformForgetResponse, InternalApiError> {
        self.api.post_json(PERFORM_FORGET_PATH, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use roompurge_types::id::{RoomId, UserId};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config(base_url: String) -> InternalApiConfig {
        InternalApiConfig {
            base_url,
            timeout_secs: 5,
            ..InternalApiConfig::default()
        }
    }

    fn forget_request() -> PerformForgetRequest {
        PerformForgetRequest {
            user_id: UserId::parse("@alice:local").unwrap(),
            room_id: RoomId::parse("!r:local").unwrap(),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_temporary_call_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RoomserverClient::new(&config(format!("http://{addr}"))).unwrap();
        let err = client.perform_forget(&forget_request()).await.unwrap_err();
        assert!(!err.remote());
        assert!(err.temporary());
    }

    #[tokio::test]
    async fn not_found_is_permanent_remote_error() {
        let base = serve(Router::new()).await;

        let client = RoomserverClient::new(&config(base)).unwrap();
        let err = client.perform_forget(&forget_request()).await.unwrap_err();
        assert!(err.remote());
        assert!(!err.temporary());
        assert!(matches!(err, InternalApiError::Remote { code: 404, .. }));
    }

    #[tokio::test]
    async fn server_error_is_temporary_and_carries_message() {
        let router = Router::new().route(
            PERFORM_FORGET_PATH,
            post(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorBody {
                        message: "storage unavailable: locked".into(),
                    }),
                )
            }),
        );
        let base = serve(router).await;

        let client = RoomserverClient::new(&config(base)).unwrap();
        let err = client.perform_forget(&forget_request()).await.unwrap_err();
        assert!(err.temporary());
        match err {
            InternalApiError::Remote { code, message, .. } => {
                assert_eq!(code, 503);
                assert_eq!(message, "storage unavailable: locked");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_decodes_response() {
        let router = Router::new().route(
            PERFORM_FORGET_PATH,
            post(|Json(req): Json<PerformForgetRequest>| async move {
                assert_eq!(req.room_id.as_str(), "!r:local");
                Json(PerformForgetResponse {})
            }),
        );
        let base = serve(router).await;

        let client = RoomserverClient::new(&config(base)).unwrap();
        let response = client.perform_forget(&forget_request()).await.unwrap();
        assert_eq!(response, PerformForgetResponse {});
    }

    #[tokio::test]
    async fn undecodable_body_is_permanent_call_error() {
        let router = Router::new().route(PERFORM_FORGET_PATH, post(|| async { "not json" }));
        let base = serve(router).await;

        let client = RoomserverClient::new(&config(base)).unwrap();
        let err = client.perform_forget(&forget_request()).await.unwrap_err();
        assert!(!err.remote());
        assert!(!err.temporary());
    }

    #[tokio::test]
    async fn deadline_expiry_is_temporary() {
        let router = Router::new().route(
            PERFORM_FORGET_PATH,
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(PerformForgetResponse {})
            }),
        );
        let base = serve(router).await;

        let client = InternalApiClient::new(&config(base)).unwrap();
        let err = client
            .call::<_, PerformForgetResponse>(
                PERFORM_FORGET_PATH,
                &forget_request(),
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        assert!(err.temporary());
        assert!(!err.remote());
    }

    #[tokio::test]
    async fn paths_outside_prefix_are_rejected() {
        let client = InternalApiClient::new(&config("http://127.0.0.1:1".into())).unwrap();
        let err = client
            .post_json::<_, PerformForgetResponse>("/roomserver/performForget", &forget_request())
            .await
            .unwrap_err();
        assert!(!err.temporary());
    }

    #[test]
    fn invalid_base_url_is_permanent() {
        let err = InternalApiClient::new(&config("not a url".into())).unwrap_err();
        assert!(!err.temporary());
    }
}
