//! Router assembly (spec §4.10).

mod dashboard;
mod plan;
mod sessions;
mod sse;
mod static_assets;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::manager::SessionManager;

/// Shared state reachable from every handler.
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub config: Config,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dashboard::dashboard))
        .route("/healthz", get(dashboard::healthz))
        .route("/events", get(sse::events))
        .route("/api/sessions", get(sessions::list_sessions))
        .route("/api/sessions/{id}", get(sessions::session_detail))
        .route("/api/plan", get(plan::get_plan))
        .fallback(static_assets::serve_static)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
