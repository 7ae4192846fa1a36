//! `GET /events[?session=ID]` (spec §4.8).

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream;
use futures_util::StreamExt;
use serde::Deserialize;

use super::AppState;
use crate::publisher::PublisherError;
use crate::session_id::SessionId;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    session: Option<String>,
}

pub async fn events(State(state): State<Arc<AppState>>, Query(query): Query<EventsQuery>) -> Response {
    let session = match resolve_session(&state, query.session).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let subscription = match session.subscribe() {
        Ok(subscription) => subscription,
        Err(PublisherError::MaxClientsExceeded) => {
            return (StatusCode::SERVICE_UNAVAILABLE, [("Retry-After", "5")], "too many subscribers")
                .into_response();
        }
    };

    let history = session.replay_all();
    let backlog = stream::iter(history.iter().map(frame).collect::<Vec<_>>());

    let guard = UnsubscribeGuard {
        session: Arc::clone(&session),
        id: subscription.id,
    };
    let live = stream::unfold((subscription.rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        Some((frame(&event), (rx, guard)))
    });

    Sse::new(backlog.chain(live))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive"))
        .into_response()
}

/// Unsubscribes from the session's publisher when dropped, whether the
/// stream ran to completion (channel closed) or the client disconnected
/// mid-stream (axum drops the response body future).
struct UnsubscribeGuard {
    session: Arc<crate::session::Session>,
    id: u64,
}

impl Drop for UnsubscribeGuard {
    fn drop(&mut self) {
        self.session.unsubscribe(self.id);
    }
}

fn frame(event: &crate::event::Event) -> Result<SseEvent, Infallible> {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Ok(SseEvent::default().data(json))
}

async fn resolve_session(state: &AppState, session_param: Option<String>) -> Result<Arc<crate::session::Session>, Response> {
    if !state.config.multi_session() {
        let sessions = state.manager.all().await;
        return sessions.into_iter().next().ok_or_else(|| StatusCode::NOT_FOUND.into_response());
    }

    let raw = session_param.ok_or_else(|| StatusCode::BAD_REQUEST.into_response())?;
    let id: SessionId = raw.parse().map_err(|_| StatusCode::BAD_REQUEST.into_response())?;
    state.manager.get(&id).await.ok_or_else(|| StatusCode::NOT_FOUND.into_response())
}
