//! HTTP endpoints for the approval gateway.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::warn;

use super::{ApprovalResponse, ApprovalSubmission, ClarificationSubmission, Gateway};
use crate::error::GatewayError;
use crate::llm::LlmHandle;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    /// Reported by `/health` only; the workflow checks availability itself.
    pub llm: LlmHandle,
}

/// Build the Axum router with the approval routes.
pub fn approval_routes(gateway: Arc<Gateway>, llm: LlmHandle) -> Router {
    let state = AppState { gateway, llm };

    Router::new()
        .route("/health", get(health))
        .route("/process-approval", post(process_approval))
        .route("/process-clarification", post(process_clarification))
        .with_state(state)
}

/// CORS for the browser front end. Credentials are allowed, so methods and
/// headers are mirrored rather than wildcarded.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GatewayError::Processing(_) | GatewayError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        };
        (
            status,
            Json(serde_json::json!({ "detail": self.to_string() })),
        )
            .into_response()
    }
}

// ── Health ──────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let llm = if state.llm.is_ready() {
        "ready"
    } else {
        "unavailable"
    };
    Json(serde_json::json!({
        "status": "ok",
        "service": "approval-assist",
        "llm": llm,
    }))
}

// ── Approval endpoints ──────────────────────────────────────────────

async fn process_approval(
    State(state): State<AppState>,
    body: Result<Json<ApprovalSubmission>, JsonRejection>,
) -> Result<Json<ApprovalResponse>, GatewayError> {
    let Json(body) = body.map_err(invalid_body)?;
    state.gateway.submit_approval(body).await.map(Json)
}

async fn process_clarification(
    State(state): State<AppState>,
    body: Result<Json<ClarificationSubmission>, JsonRejection>,
) -> Result<Json<ApprovalResponse>, GatewayError> {
    let Json(body) = body.map_err(invalid_body)?;
    state.gateway.submit_clarification(body).await.map(Json)
}

/// Malformed bodies get the same `{"detail": ...}` shape as other client errors.
fn invalid_body(rejection: JsonRejection) -> GatewayError {
    warn!(status = %rejection.status(), error = %rejection.body_text(), "Rejected request body");
    GatewayError::InvalidInput(rejection.body_text())
}
