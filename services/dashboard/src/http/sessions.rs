//! `GET /api/sessions` and `GET /api/sessions/:id` (spec §4.10).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AppState;
use crate::event::Signal;
use crate::session::SessionState;
use crate::session_id::SessionId;

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub state: SessionState,
    pub plan_path: Option<String>,
    pub branch: Option<String>,
    pub mode: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    /// The most recent `COMPLETED`/`FAILED` signal seen, if any (spec §9:
    /// only these two are terminal for badge purposes). `None` while a run
    /// is still in progress or never emitted one.
    pub terminal_signal: Option<Signal>,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub event_count: usize,
}

pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSummary>> {
    if !state.config.multi_session() {
        return Json(Vec::new());
    }

    let mut summaries: Vec<SessionSummary> = Vec::new();
    for session in state.manager.all().await {
        summaries.push(summarize(&session));
    }
    summaries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    Json(summaries)
}

pub async fn session_detail(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id: SessionId = match id.parse() {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    match state.manager.get(&id).await {
        Some(session) => Json(SessionDetail {
            summary: summarize(&session),
            event_count: session.replay_all().len(),
        })
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn summarize(session: &crate::session::Session) -> SessionSummary {
    let metadata = session.metadata();
    let last_modified = std::fs::metadata(&session.path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    let terminal_signal = session
        .replay_all()
        .into_iter()
        .rev()
        .find_map(|event| match event {
            crate::event::Event::Signal { signal, .. } if signal.is_terminal() => Some(signal),
            _ => None,
        });
    SessionSummary {
        id: session.id.to_string(),
        state: session.state(),
        plan_path: metadata.plan_path,
        branch: metadata.branch,
        mode: metadata.mode,
        start_time: metadata.start_time,
        last_modified,
        terminal_signal,
    }
}
