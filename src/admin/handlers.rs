use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ProviderErrorKind, ResilienceError};
use crate::http::server::AppState;
use crate::polling::SessionInfo;
use crate::resilience::ResilienceSnapshot;
use crate::store::{AssetRecord, UpdateSource};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub circuit_state: &'static str,
    pub assets_tracked: usize,
    pub active_poll_sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAsset {
    pub input_url: String,
}

/// Map a failed provider operation onto an HTTP response.
pub fn error_response(error: &ResilienceError) -> Response {
    let status = match error {
        ResilienceError::CircuitOpen | ResilienceError::RetryBudgetExhausted { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ResilienceError::Permanent(e) => match e.kind {
            ProviderErrorKind::Status(code) if (400..500).contains(&code) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::BAD_GATEWAY,
        },
        ResilienceError::PollTimeout { .. } | ResilienceError::PollAttemptsExhausted { .. } => {
            StatusCode::GATEWAY_TIMEOUT
        }
        ResilienceError::Transient { .. } | ResilienceError::WebhookRejected(_) => StatusCode::BAD_GATEWAY,
    };

    (
        status,
        Json(json!({
            "error": error.label(),
            "message": error.to_string(),
            "retry_later": error.is_try_again_later(),
        })),
    )
        .into_response()
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if state.context.is_healthy() { "operational" } else { "degraded" },
        uptime_secs: state.started_at.elapsed().as_secs(),
        circuit_state: state.context.breaker().state().as_str(),
        assets_tracked: state.store.count(),
        active_poll_sessions: state.poller.active_sessions().len(),
    })
}

pub async fn get_resilience(State(state): State<AppState>) -> Json<ResilienceSnapshot> {
    Json(state.context.snapshot())
}

pub async fn get_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.poller.active_sessions())
}

pub async fn list_assets(State(state): State<AppState>) -> Json<Vec<AssetRecord>> {
    Json(state.store.list())
}

pub async fn get_asset(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.get(&id) {
        Some(record) => Json(record).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown_asset" }))).into_response(),
    }
}

/// Submit a new asset through the breaker, then poll it.
///
/// Creation is not idempotent, so it gets exactly one attempt.
pub async fn submit_asset(State(state): State<AppState>, Json(request): Json<SubmitAsset>) -> Response {
    let result = state
        .context
        .execute_once("create_asset", None, state.client.create_asset(&request.input_url))
        .await;

    match result {
        Ok(asset) => {
            state.store.apply_status(&asset, UpdateSource::Submission);
            let session_id = if asset.status.is_terminal() {
                None
            } else {
                state.context.record_outcome(&asset.asset_id, "create_asset", None);
                Some(state.start_tracking(&asset.asset_id).session_id)
            };

            tracing::info!(asset_id = %asset.asset_id, "Asset submitted");
            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "asset_id": asset.asset_id,
                    "status": asset.status.as_str(),
                    "poll_session_id": session_id,
                })),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn start_poll(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let handle = state.start_tracking(&id);
    (
        StatusCode::ACCEPTED,
        Json(json!({ "asset_id": id, "poll_session_id": handle.session_id })),
    )
        .into_response()
}

pub async fn stop_poll(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.poller.stop_polling(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
