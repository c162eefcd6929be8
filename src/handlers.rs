// HTTP request handlers for server mode
//
// Push endpoints for the native and OTLP formats, the ring status page and
// health checks

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use logpush_core::{BodyStatus, RawRequest};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::error_writer::{HttpErrorWriter, OtlpErrorWriter};
use crate::status::render_ring_status;
use crate::AppState;

/// POST /loki/api/v1/push - native push endpoint
pub(crate) async fn handle_push(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let request = raw_request(headers, body);
    state
        .push
        .handle(request, Arc::clone(&state.native_parser), &HttpErrorWriter)
        .await
}

/// POST /otlp/v1/logs - OTLP log push endpoint
pub(crate) async fn handle_otlp_push(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let request = raw_request(headers, body);
    state
        .push
        .handle(request, Arc::clone(&state.otlp_parser), &OtlpErrorWriter)
        .await
}

/// /distributor/ring - ring status, any method
pub(crate) async fn ring_status(State(state): State<AppState>, request: Request) -> Response {
    render_ring_status(state.rate_strategy, state.ring.as_ref(), request).await
}

/// GET /health - Basic health check
pub(crate) async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

/// GET /ready - Readiness check
pub(crate) async fn ready_check(State(_state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ready"})))
}

/// The body limit layer stops reading at the configured maximum; that is
/// reported to the parsing pipeline rather than answered here.
fn raw_request(headers: HeaderMap, body: Result<Bytes, BytesRejection>) -> RawRequest {
    match body {
        Ok(body) => RawRequest::new(headers, body),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            debug!("request body exceeded the size limit while reading");
            RawRequest::with_status(headers, BodyStatus::ExceededLimit)
        }
        Err(rejection) => {
            RawRequest::with_status(headers, BodyStatus::Unreadable(rejection.body_text()))
        }
    }
}
