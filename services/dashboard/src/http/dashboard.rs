//! `GET /` and `GET /healthz` (spec §4.10, ambient liveness probe).

use std::sync::Arc;

use axum::extract::State;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use super::AppState;

const TEMPLATE: &str = include_str!("../../templates/dashboard.html");

pub async fn dashboard(State(state): State<Arc<AppState>>) -> Response {
    let (plan_name, branch) = match state.manager.all().await.first() {
        Some(session) => {
            let metadata = session.metadata();
            (
                metadata.plan_path.unwrap_or_else(|| "(no plan)".to_string()),
                metadata.branch.unwrap_or_else(|| "(unknown)".to_string()),
            )
        }
        None => ("(no plan)".to_string(), "(unknown)".to_string()),
    };

    let html = TEMPLATE
        .replace("{{PLAN_NAME}}", &html_escape(&plan_name))
        .replace("{{BRANCH}}", &html_escape(&branch));
    Html(html).into_response()
}

fn html_escape(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[derive(Serialize)]
pub(crate) struct Health {
    status: &'static str,
    sessions: usize,
}

pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        sessions: state.manager.all().await.len(),
    })
}
