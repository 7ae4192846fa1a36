//! `GET /api/plan[?session=ID]` (spec §4.10).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::AppState;
use crate::plan::{load_plan, PlanPathError};
use crate::session_id::SessionId;

#[derive(Debug, Deserialize)]
pub struct PlanQuery {
    session: Option<String>,
}

pub async fn get_plan(State(state): State<Arc<AppState>>, Query(query): Query<PlanQuery>) -> Response {
    let session = if state.config.multi_session() {
        let Some(raw) = query.session else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        let Ok(id): Result<SessionId, _> = raw.parse() else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        match state.manager.get(&id).await {
            Some(session) => session,
            None => return StatusCode::NOT_FOUND.into_response(),
        }
    } else {
        match state.manager.all().await.into_iter().next() {
            Some(session) => session,
            None => return StatusCode::NOT_FOUND.into_response(),
        }
    };

    let metadata = session.metadata();
    let Some(plan_path) = metadata.plan_path else {
        return Json(crate::plan::Plan { items: Vec::new() }).into_response();
    };

    let plan_dir = session.path.parent().unwrap_or_else(|| std::path::Path::new("."));
    match load_plan(plan_dir, &plan_path) {
        Ok(plan) => Json(plan).into_response(),
        Err(PlanPathError::Absolute | PlanPathError::ParentTraversal) => StatusCode::BAD_REQUEST.into_response(),
    }
}
