//! REST API handlers for standalone configs, plus the response helpers
//! shared with [`crate::group_handlers`].

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use cfgrid_state::*;

use crate::ApiState;

/// Header carrying the client's idempotency token.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    already_applied: bool,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
            already_applied: false,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
            already_applied: false,
        }),
    )
        .into_response()
}

/// Map a store error onto a status code.
pub(crate) fn state_error(e: &StateError) -> Response {
    let status = match e {
        StateError::NotFound(_) => StatusCode::NOT_FOUND,
        StateError::Conflict { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %e, "store operation failed");
    }
    error_response(&e.to_string(), status)
}

/// Render a gated write: 201 with the entity, or 200 flagged as a replay.
pub(crate) fn applied_response<T: serde::Serialize>(outcome: Applied<T>, created: StatusCode) -> Response {
    match outcome {
        Applied::Applied(value) => (created, ApiResponse::ok(value)).into_response(),
        Applied::AlreadyApplied => {
            warn!("idempotent replay");
            Json(ApiResponse::<()> {
                success: true,
                data: None,
                error: None,
                already_applied: true,
            })
            .into_response()
        }
    }
}

/// Token from the `Idempotency-Key` header; empty when absent.
pub(crate) fn idempotency_token(headers: &HeaderMap) -> &str {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Parse a version path segment.
pub(crate) fn parse_version(raw: &str) -> Result<Version, Response> {
    raw.parse().map_err(|_| {
        error_response(
            &format!("invalid version {raw:?}: expected a non-negative integer"),
            StatusCode::BAD_REQUEST,
        )
    })
}

// ── Configs ────────────────────────────────────────────────────

/// GET /configs
pub async fn list_configs(State(state): State<ApiState>) -> Response {
    match state.configs.get_all_configs() {
        Ok(configs) => ApiResponse::ok(configs).into_response(),
        Err(e) => state_error(&e),
    }
}

/// GET /configs/{name}/{version}
pub async fn get_config(
    State(state): State<ApiState>,
    Path((name, version)): Path<(String, String)>,
) -> Response {
    let version = match parse_version(&version) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.configs.get_config(&name, version) {
        Ok(config) => ApiResponse::ok(config).into_response(),
        Err(e) => state_error(&e),
    }
}

/// POST /configs
pub async fn add_config(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(config): Json<Config>,
) -> Response {
    if let Err(msg) = config.check_keys() {
        return error_response(&msg, StatusCode::BAD_REQUEST);
    }
    match state.configs.add_config(&config, idempotency_token(&headers)) {
        Ok(outcome) => applied_response(outcome, StatusCode::CREATED),
        Err(e) => state_error(&e),
    }
}

/// DELETE /configs/{name}/{version}
pub async fn delete_config(
    State(state): State<ApiState>,
    Path((name, version)): Path<(String, String)>,
) -> Response {
    let version = match parse_version(&version) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.configs.delete_config(&name, version) {
        Ok(()) => ApiResponse::ok("deleted").into_response(),
        Err(e) => state_error(&e),
    }
}

/// DELETE /configs
pub async fn delete_all_configs(State(state): State<ApiState>) -> Response {
    match state.configs.delete_all_configs() {
        Ok(count) => ApiResponse::ok(serde_json::json!({ "deleted": count })).into_response(),
        Err(e) => state_error(&e),
    }
}
