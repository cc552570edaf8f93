//! Authenticated admin API.
//!
//! All routes require `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/resilience", get(get_resilience))
        .route("/admin/sessions", get(get_sessions))
        .route("/admin/assets", get(list_assets).post(submit_asset))
        .route("/admin/assets/{id}", get(get_asset))
        .route("/admin/assets/{id}/poll", post(start_poll).delete(stop_poll))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
