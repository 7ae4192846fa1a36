//! Background reader that converts a growing progress file into a stream of
//! [`Event`]s (spec §4.4).

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::event::{Event, Phase};
use crate::parser::{parse_line, LineKind, ParsedLine};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum TailerError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Tailer configuration (spec §4.4 `New(path, {pollInterval, initialPhase, fromStart})`).
pub struct TailerConfig {
    pub poll_interval: Duration,
    pub initial_phase: Phase,
    pub from_start: bool,
}

impl Default for TailerConfig {
    fn default() -> TailerConfig {
        TailerConfig {
            poll_interval: DEFAULT_POLL_INTERVAL,
            initial_phase: Phase::Task,
            from_start: true,
        }
    }
}

/// A running background tailer. Dropping or calling [`Tailer::stop`] cancels
/// the background task and closes the event stream.
pub struct Tailer {
    shutdown_tx: watch::Sender<bool>,
}

impl Tailer {
    /// Open `path` and spawn the background polling task. Returns the
    /// tailer handle and the receiving end of its event stream.
    pub fn start(path: &Path, config: TailerConfig) -> Result<(Tailer, mpsc::Receiver<Event>), TailerError> {
        let file = std::fs::File::open(path).map_err(|source| TailerError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::channel(1024);

        let path = path.to_path_buf();
        tokio::spawn(run_tail_loop(path, file, config, event_tx, shutdown_rx));

        Ok((Tailer { shutdown_tx }, event_rx))
    }

    /// Idempotent. Safe to call multiple times.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for Tailer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct TailState {
    offset: u64,
    in_header: bool,
    phase: Phase,
    inode: Option<u64>,
    pending: String,
}

async fn run_tail_loop(
    path: PathBuf,
    mut file: std::fs::File,
    config: TailerConfig,
    event_tx: mpsc::Sender<Event>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut state = TailState {
        offset: 0,
        in_header: true,
        phase: config.initial_phase,
        inode: file_inode(&file),
        pending: String::new(),
    };

    if !config.from_start {
        if let Ok(len) = file.metadata().map(|m| m.len()) {
            state.offset = len;
        }
    }

    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if let Err(err) = poll_once(&path, &mut file, &mut state, &event_tx).await {
                    tracing::debug!(%err, path = %path.display(), "tailer poll failed, will retry");
                }
            }
        }
    }
}

async fn poll_once(
    path: &Path,
    file: &mut std::fs::File,
    state: &mut TailState,
    event_tx: &mpsc::Sender<Event>,
) -> std::io::Result<()> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return Ok(()), // transient: file missing mid-poll, retry next tick
    };

    let current_inode = Some(inode_of(&metadata));
    let rotated = state.inode.is_some() && current_inode != state.inode;
    let shrank = metadata.len() < state.offset;

    if rotated || shrank {
        *file = std::fs::File::open(path)?;
        state.offset = 0;
        state.in_header = true;
        state.pending.clear();
    }
    state.inode = current_inode;

    file.seek(SeekFrom::Start(state.offset))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    if buf.is_empty() {
        return Ok(());
    }

    state.pending.push_str(&String::from_utf8_lossy(&buf));
    state.offset += buf.len() as u64;

    // Only complete, newline-terminated lines are consumed; a partial final
    // line is held back until more data arrives.
    while let Some(pos) = state.pending.find('\n') {
        let line = state.pending[..pos].trim_end_matches('\r').to_string();
        state.pending.drain(..=pos);
        emit_line(&line, state, event_tx).await;
    }

    Ok(())
}

async fn emit_line(line: &str, state: &mut TailState, event_tx: &mpsc::Sender<Event>) {
    let (parsed, next_in_header) = parse_line(line, state.in_header, state.phase);
    state.in_header = next_in_header;

    let event = match parsed {
        ParsedLine::Skip => return,
        ParsedLine::Section { label, phase } => {
            state.phase = phase;
            Event::Section {
                phase,
                section: label,
                timestamp: Utc::now(),
            }
        }
        ParsedLine::Timestamped { kind, text, timestamp } => match kind {
            LineKind::Output => Event::Output {
                phase: state.phase,
                text,
                timestamp,
            },
            LineKind::Error => Event::Error {
                phase: state.phase,
                text,
                timestamp,
            },
            LineKind::Warn => Event::Warn {
                phase: state.phase,
                text,
                timestamp,
            },
            LineKind::Signal(signal) => Event::Signal {
                phase: state.phase,
                signal,
                timestamp,
            },
        },
        ParsedLine::Plain { text } => Event::Output {
            phase: state.phase,
            text,
            timestamp: Utc::now(),
        },
    };

    let _ = event_tx.send(event).await;
}

fn file_inode(file: &std::fs::File) -> Option<u64> {
    file.metadata().ok().map(|m| inode_of(&m))
}

#[cfg(unix)]
fn inode_of(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn inode_of(metadata: &std::fs::Metadata) -> u64 {
    // No stable inode-equivalent; fall back to length + modified time as a
    // coarse rotation signal (still correct for the "did the file change
    // identity" check, just less precise than an inode comparison).
    use std::time::UNIX_EPOCH;
    let modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    modified ^ metadata.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::time::{sleep, timeout, Duration as TokioDuration};

    async fn collect_for(rx: &mut mpsc::Receiver<Event>, n: usize, max_wait: TokioDuration) -> Vec<Event> {
        let mut out = Vec::new();
        let deadline = tokio::time::Instant::now() + max_wait;
        while out.len() < n && tokio::time::Instant::now() < deadline {
            if let Ok(Some(e)) = timeout(TokioDuration::from_millis(50), rx.recv()).await {
                out.push(e);
            }
        }
        out
    }

    #[tokio::test]
    async fn empty_file_emits_no_events() {
        let file = NamedTempFile::new().unwrap();
        let (tailer, mut rx) = Tailer::start(
            file.path(),
            TailerConfig {
                poll_interval: Duration::from_millis(20),
                ..Default::default()
            },
        )
        .unwrap();
        let events = collect_for(&mut rx, 1, TokioDuration::from_millis(150)).await;
        assert!(events.is_empty());
        tailer.stop();
    }

    #[tokio::test]
    async fn header_then_task_produces_expected_sequence() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "# Ralphex Progress Log\nPlan: docs/plan.md\nBranch: main\nMode: full\nStarted: 2026-01-22 10:00:00\n------------------------------------------------------------\n"
        )
        .unwrap();
        file.flush().unwrap();

        let (tailer, mut rx) = Tailer::start(
            file.path(),
            TailerConfig {
                poll_interval: Duration::from_millis(20),
                ..Default::default()
            },
        )
        .unwrap();

        sleep(Duration::from_millis(60)).await;
        writeln!(
            file,
            "--- task iteration 1 ---\n[26-01-22 10:00:01] starting\n[26-01-22 10:00:02] <<<RALPHEX:ALL_TASKS_DONE>>>"
        )
        .unwrap();
        file.flush().unwrap();

        let events = collect_for(&mut rx, 3, TokioDuration::from_secs(2)).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Event::Section { .. }));
        assert!(matches!(events[1], Event::Output { .. }));
        assert!(matches!(events[2], Event::Signal { .. }));
        tailer.stop();
    }

    #[tokio::test]
    async fn no_trailing_newline_holds_back_partial_line() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "---\n[26-01-22 10:00:01] partial line no newline").unwrap();
        file.flush().unwrap();

        let (tailer, mut rx) = Tailer::start(
            file.path(),
            TailerConfig {
                poll_interval: Duration::from_millis(20),
                ..Default::default()
            },
        )
        .unwrap();
        let events = collect_for(&mut rx, 1, TokioDuration::from_millis(150)).await;
        assert!(events.is_empty());
        tailer.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let file = NamedTempFile::new().unwrap();
        let (tailer, _rx) = Tailer::start(file.path(), TailerConfig::default()).unwrap();
        tailer.stop();
        tailer.stop();
    }
}
