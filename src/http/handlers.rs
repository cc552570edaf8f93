//! Public endpoints: provider webhooks and health.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::error::ResilienceError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::webhook::{RejectReason, Verification, VideoEvent, WebhookEnvelope, SIGNATURE_HEADER};

/// 401 for deliveries we cannot trust, 400 for deliveries we cannot read.
pub fn rejection_status(reason: RejectReason) -> StatusCode {
    match reason {
        RejectReason::BadSignature | RejectReason::Stale => StatusCode::UNAUTHORIZED,
        RejectReason::Malformed => StatusCode::BAD_REQUEST,
    }
}

fn reject(reason: RejectReason) -> Response {
    let error = ResilienceError::WebhookRejected(reason);
    tracing::warn!(reason = reason.as_str(), error = %error, "Webhook rejected");
    metrics::record_webhook(reason.as_str());
    (
        rejection_status(reason),
        Json(json!({ "error": reason.as_str() })),
    )
        .into_response()
}

/// `POST /webhooks/video`
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let Some(header) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        return reject(RejectReason::Malformed);
    };
    let envelope = match WebhookEnvelope::from_header(body.to_vec(), header) {
        Ok(envelope) => envelope,
        Err(reason) => return reject(reason),
    };

    let payload = match state.verifier.load().verify(&envelope) {
        Verification::Verified(payload) => payload,
        Verification::Rejected(reason) => return reject(reason),
    };

    let event = match VideoEvent::parse(&payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Verified webhook has unreadable payload");
            metrics::record_webhook("invalid_payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_payload" })),
            )
                .into_response();
        }
    };

    let applied = state.store.apply_event(&event);
    let finished = applied && event.status().is_some_and(|s| s.is_terminal());
    if finished {
        state.context.forget(event.asset_id());
        if state.poller.stop_polling(event.asset_id()) {
            tracing::debug!(asset_id = event.asset_id(), "Webhook settled asset, poll session stopped");
        }
    }

    tracing::info!(
        request_id = %request_id,
        event_type = %event.kind,
        asset_id = event.asset_id(),
        applied,
        "Webhook processed"
    );
    metrics::record_webhook(if applied { "applied" } else { "ignored" });

    (StatusCode::OK, Json(json!({ "received": true, "applied": applied }))).into_response()
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub circuit_state: &'static str,
    pub retry_budget_remaining: u32,
    pub active_poll_sessions: usize,
}

/// `GET /health`. Always 200; a degraded provider does not make this
/// service unavailable.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if state.context.is_healthy() { "healthy" } else { "degraded" },
        circuit_state: state.context.breaker().state().as_str(),
        retry_budget_remaining: state.context.budget().remaining(),
        active_poll_sessions: state.poller.active_sessions().len(),
    })
}
