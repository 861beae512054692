#![allow(clippy::result_large_err)] // Trigger helpers return AppError for consistent diagnostics.

use crate::core::config::ServerConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::state::ApprovalKind;
use crate::core::workflow::steps::{StepKind, StepRuntime};
use crate::core::workflow::store::{ApprovalStore, WorkflowStore};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Extension, Path},
    http::{header, HeaderMap, HeaderValue, Response, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Map, Value};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::util::MapResponseLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;
use uuid::Uuid;

/// Throttling decision for one trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

/// Pluggable request throttle consulted before any step work starts.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, workflow_id: Uuid) -> RateDecision;
}

/// Default limiter that admits everything.
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn check(&self, _workflow_id: Uuid) -> RateDecision {
        RateDecision::Allowed
    }
}

/// State shared across trigger requests.
pub struct ServerState {
    runtime: Arc<StepRuntime>,
    workflows: Arc<dyn WorkflowStore>,
    approvals: Arc<dyn ApprovalStore>,
    rate_limiter: Arc<dyn RateLimiter>,
    auth_token: String,
}

impl ServerState {
    pub fn new(
        runtime: Arc<StepRuntime>,
        workflows: Arc<dyn WorkflowStore>,
        approvals: Arc<dyn ApprovalStore>,
        rate_limiter: Arc<dyn RateLimiter>,
        auth_token: String,
    ) -> Self {
        Self {
            runtime,
            workflows,
            approvals,
            rate_limiter,
            auth_token,
        }
    }
}

/// Start the trigger listener and block until the service terminates.
pub async fn serve(config: &ServerConfig, state: ServerState) -> Result<(), AppError> {
    serve_internal(config, state, None).await
}

/// Start the trigger listener and notify once the bind address is known (test helper).
pub async fn serve_with_ready_notifier(
    config: &ServerConfig,
    state: ServerState,
    ready_notifier: oneshot::Sender<SocketAddr>,
) -> Result<(), AppError> {
    serve_internal(config, state, Some(ready_notifier)).await
}

async fn serve_internal(
    config: &ServerConfig,
    state: ServerState,
    ready_notifier: Option<oneshot::Sender<SocketAddr>>,
) -> Result<(), AppError> {
    let bind_addr: SocketAddr = config.bind.parse().map_err(|err| {
        AppError::new(
            ErrorCategory::ValidationError,
            format!("invalid trigger bind address {}: {}", config.bind, err),
        )
    })?;
    let router = build_router(Arc::new(state), config.max_body_bytes);
    let listener = TcpListener::bind(bind_addr).await.map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to bind trigger listener {}: {}", bind_addr, err),
        )
    })?;
    let local_addr = listener.local_addr().map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to determine trigger listener address: {}", err),
        )
    })?;
    if let Some(tx) = ready_notifier {
        let _ = tx.send(local_addr);
    }
    info!("trigger server listening on {}", local_addr);
    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| {
            AppError::new(
                ErrorCategory::InternalError,
                format!("trigger server terminated: {}", err),
            )
        })
}

/// Router construction, shared with in-process tests via `tower::Service`.
pub fn build_router(state: Arc<ServerState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/v1/workflows/{id}/steps/{step}", post(handle_step))
        .route("/v1/workflows/{id}/approvals", get(handle_approvals))
        .layer(Extension(state))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(MapResponseLayer::new(|mut response: Response<Body>| {
            if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
                let body = json!({
                    "error": {
                        "code": "WF-HTTP-413",
                        "message": "payload too large"
                    }
                })
                .to_string();
                *response.body_mut() = Body::from(body);
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
            }
            response
        }))
}

/// Resolve the bearer token from the configured environment variable.
pub fn load_auth_token(config: &ServerConfig) -> Result<String, AppError> {
    let token = env::var(&config.auth_token_env).map_err(|_| {
        AppError::new(
            ErrorCategory::ValidationError,
            format!(
                "auth token environment variable {} is not set",
                config.auth_token_env
            ),
        )
    })?;
    if token.trim().is_empty() {
        return Err(AppError::new(
            ErrorCategory::ValidationError,
            format!(
                "auth token environment variable {} is empty",
                config.auth_token_env
            ),
        ));
    }
    Ok(token)
}

async fn handle_step(
    Extension(state): Extension<Arc<ServerState>>,
    Path((workflow_id, step_name)): Path<(Uuid, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, StepRejection> {
    if !is_authorized(&headers, &state.auth_token) {
        return Err(StepRejection::unauthorized());
    }
    if let RateDecision::Limited { retry_after } =
        state.rate_limiter.check(workflow_id).await
    {
        return Err(StepRejection::rate_limited(retry_after));
    }
    let step = StepKind::parse(&step_name)
        .ok_or_else(|| StepRejection::bad_request("unknown step name"))?;

    let outcome = state
        .runtime
        .run_step(workflow_id, step)
        .await
        .map_err(StepRejection::from_app_error)?;
    Ok(Json(json!({
        "workflow_id": outcome.workflow_id.to_string(),
        "step": outcome.step.as_str(),
        "status": outcome.new_state.as_str(),
        "retry_count": outcome.retry_count,
        "result": outcome.payload,
    })))
}

async fn handle_approvals(
    Extension(state): Extension<Arc<ServerState>>,
    Path(workflow_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Value>, StepRejection> {
    if !is_authorized(&headers, &state.auth_token) {
        return Err(StepRejection::unauthorized());
    }
    let record = state
        .workflows
        .get(workflow_id)
        .await
        .map_err(StepRejection::from_app_error)?
        .ok_or_else(|| StepRejection::not_found("workflow does not exist"))?;

    let (seed, topic) = futures::future::try_join(
        state
            .approvals
            .find_approval(workflow_id, ApprovalKind::SeedKeywords),
        state
            .approvals
            .find_approval(workflow_id, ApprovalKind::TopicClusters),
    )
    .await
    .map_err(StepRejection::from_app_error)?;
    let approvals: Vec<Value> = [seed, topic]
        .into_iter()
        .flatten()
        .map(|approval| serde_json::to_value(&approval).unwrap_or(Value::Null))
        .collect();
    Ok(Json(json!({
        "workflow_id": workflow_id.to_string(),
        "status": record.state.as_str(),
        "approvals": approvals,
    })))
}

fn is_authorized(headers: &HeaderMap, expected: &str) -> bool {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    if let Some(token) = header_value {
        token.as_bytes().ct_eq(expected.as_bytes()).into()
    } else {
        false
    }
}

struct StepRejection {
    status: StatusCode,
    code: String,
    message: String,
    extra: Map<String, Value>,
    retry_after: Option<Duration>,
}

impl StepRejection {
    fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            extra: Map::new(),
            retry_after: None,
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "WF-HTTP-401", "unauthorized")
    }

    fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "WF-HTTP-400", message)
    }

    fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "WF-HTTP-404", message)
    }

    fn rate_limited(retry_after: Duration) -> Self {
        let mut rejection = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "WF-HTTP-429",
            "rate limit exceeded",
        );
        rejection.extra.insert(
            "retry_after_seconds".to_string(),
            json!(retry_after.as_secs()),
        );
        rejection.retry_after = Some(retry_after);
        rejection
    }

    fn from_app_error(err: AppError) -> Self {
        let status = match err.category {
            ErrorCategory::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCategory::AuthError => StatusCode::UNAUTHORIZED,
            ErrorCategory::NotFoundError => StatusCode::NOT_FOUND,
            ErrorCategory::TimeoutError => StatusCode::REQUEST_TIMEOUT,
            ErrorCategory::ConflictError => StatusCode::CONFLICT,
            ErrorCategory::GateBlockedError => StatusCode::LOCKED,
            ErrorCategory::RateLimitError => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("step execution error: {}", err);
            return Self::new(status, "WF-HTTP-500", "internal server error");
        }

        let mut rejection = Self::new(status, err.code.clone(), err.message.clone());
        // Gate and conflict rejections carry enough structure for the caller
        // to act on without another round trip.
        for key in [
            "workflow_status",
            "gate",
            "gate_status",
            "required_action",
            "blocked_at",
        ] {
            if let Some(value) = err.context.get(key) {
                rejection
                    .extra
                    .insert(key.to_string(), Value::String(value.clone()));
            }
        }
        rejection
    }
}

impl IntoResponse for StepRejection {
    fn into_response(self) -> Response<Body> {
        let mut body = Map::new();
        body.insert(
            "error".to_string(),
            json!({
                "code": self.code,
                "message": self.message
            }),
        );
        for (key, value) in self.extra {
            body.insert(key, value);
        }
        let mut resp = Json(Value::Object(body)).into_response();
        *resp.status_mut() = self.status;
        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
                resp.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        resp
    }
}
