//! A single monitored run: its identity, its live tail (if any), its replay
//! buffer, and its SSE fan-out (spec §4.5).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

use crate::event::{Event, Phase};
use crate::publisher::{PublisherError, SsePublisher, Subscription};
use crate::replay_buffer::ReplayBuffer;
use crate::session_id::SessionId;
use crate::tailer::{Tailer, TailerConfig, TailerError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Tailer(#[from] TailerError),
    #[error(transparent)]
    Publisher(#[from] PublisherError),
}

/// Header metadata parsed out of a progress file's top block, if present.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SessionMetadata {
    pub plan_path: Option<String>,
    pub branch: Option<String>,
    pub mode: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
}

/// Whether a session's backing process is still writing to its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Completed,
}

struct TailHandle {
    tailer: Tailer,
}

/// One monitored run: identity, metadata, buffered history, and live fan-out.
pub struct Session {
    pub id: SessionId,
    pub path: PathBuf,
    metadata: Mutex<SessionMetadata>,
    state: Mutex<SessionState>,
    current_phase: Mutex<Phase>,
    loaded: AtomicBool,
    buffer: ReplayBuffer,
    publisher: SsePublisher,
    tail: Mutex<Option<TailHandle>>,
    poll_interval: Duration,
}

impl Session {
    pub fn new(
        path: PathBuf,
        buffer_capacity: usize,
        max_clients: usize,
        client_buffer: usize,
        poll_interval: Duration,
    ) -> Session {
        let id = SessionId::from_path(&path);
        Session {
            id,
            path,
            metadata: Mutex::new(SessionMetadata::default()),
            // Defaults to Completed: a session is only Active once
            // `refresh_states` has confirmed its file is actively locked.
            state: Mutex::new(SessionState::Completed),
            current_phase: Mutex::new(Phase::Task),
            loaded: AtomicBool::new(false),
            buffer: ReplayBuffer::new(buffer_capacity),
            publisher: SsePublisher::new(max_clients, client_buffer),
            tail: Mutex::new(None),
            poll_interval,
        }
    }

    pub fn metadata(&self) -> SessionMetadata {
        self.metadata.lock().unwrap().clone()
    }

    pub fn set_metadata(&self, metadata: SessionMetadata) {
        *self.metadata.lock().unwrap() = metadata;
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn is_tailing(&self) -> bool {
        self.tail.lock().unwrap().is_some()
    }

    /// Append an event to this session's replay buffer and fan it out to
    /// any live SSE subscribers. Does not itself read from the file.
    pub fn publish(&self, event: Event) {
        *self.current_phase.lock().unwrap() = event.phase();
        self.buffer.add(event.clone());
        self.publisher.broadcast(event);
    }

    pub fn replay_all(&self) -> Vec<Event> {
        self.buffer.all()
    }

    pub fn replay_by_phase(&self, phase: Phase) -> Vec<Event> {
        self.buffer.by_phase(phase)
    }

    pub fn subscribe(&self) -> Result<Subscription, PublisherError> {
        self.publisher.subscribe()
    }

    pub fn unsubscribe(&self, id: u64) {
        self.publisher.unsubscribe(id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.publisher.client_count()
    }

    pub fn dropped_events(&self) -> u64 {
        self.publisher.dropped_events()
    }

    /// Linearizable test-and-set: returns `true` exactly once, for the
    /// first caller, so cold-replay-on-discovery happens at most once per
    /// session (spec §4.6).
    pub fn mark_loaded_if_not(&self) -> bool {
        self.loaded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Start a background tailer reading from `path`, publishing parsed
    /// events into this session. Idempotent: a second call while already
    /// tailing is a no-op.
    ///
    /// Takes `self: &Arc<Self>` because the forwarding task below holds a
    /// clone across an `.await` loop for as long as the tailer runs.
    pub fn start_tailing(self: &Arc<Self>, from_start: bool) -> Result<(), SessionError> {
        let mut tail = self.tail.lock().unwrap();
        if tail.is_some() {
            return Ok(());
        }

        let initial_phase = *self.current_phase.lock().unwrap();
        let (tailer, mut rx) = Tailer::start(
            &self.path,
            TailerConfig {
                poll_interval: self.poll_interval,
                initial_phase,
                from_start,
            },
        )?;

        *tail = Some(TailHandle { tailer });
        drop(tail);

        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                session.publish(event);
            }
            tracing::debug!(path = %session.path.display(), "tailer event stream closed");
        });

        Ok(())
    }

    /// Idempotent: stopping a session that is not tailing is a no-op.
    pub fn stop_tailing(&self) {
        let mut tail = self.tail.lock().unwrap();
        if let Some(handle) = tail.take() {
            handle.tailer.stop();
        }
    }

    pub fn close(&self) {
        self.stop_tailing();
        self.publisher.close();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_tailing();
    }
}

/// Parse the `Plan:` / `Branch:` / `Mode:` header lines (spec §6) out of a
/// progress file's leading block, stopping at the header-terminating
/// separator or end of file.
pub fn parse_header(path: &Path) -> std::io::Result<SessionMetadata> {
    let contents = std::fs::read_to_string(path)?;
    let mut metadata = SessionMetadata::default();
    for line in contents.lines() {
        if line.trim_start().starts_with("---") {
            break;
        }
        if let Some(rest) = line.strip_prefix("Plan:") {
            metadata.plan_path = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("Branch:") {
            metadata.branch = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("Mode:") {
            metadata.mode = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("Started:") {
            metadata.start_time = parse_four_digit_year_timestamp(rest.trim());
        }
    }
    Ok(metadata)
}

/// Parse the header's `Started: YYYY-MM-DD HH:MM:SS` stamp (four-digit year,
/// already UTC, unlike the two-digit-year per-line stamps in `parser.rs`,
/// which are local time).
fn parse_four_digit_year_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}
