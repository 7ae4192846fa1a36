//! The runner-facing logging capability set (spec §4.9, §9 REDESIGN FLAGS):
//! a small trait plus two implementors, a plain file logger and a decorator
//! that additionally publishes typed [`Event`]s to a [`Session`].

use std::fmt::Write as _;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;

use crate::event::{Event, Phase, Signal};
use crate::session::Session;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("failed to open progress file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write to progress file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A typed replacement for regex-matched section labels (spec §9 REDESIGN
/// FLAGS): the runner already knows what kind of section it is opening, so
/// the logger dispatches on the variant instead of re-parsing the label it
/// is about to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    TaskIteration(u32),
    ClaudeReview(u32, Option<String>),
    CodexIteration(u32),
    ClaudeEval,
    Generic(String),
}

impl Section {
    /// The literal label written to the on-disk `--- Label ---` line.
    pub fn label(&self) -> String {
        match self {
            Section::TaskIteration(n) => format!("Task Iteration {n}"),
            Section::ClaudeReview(n, Some(suffix)) => format!("Claude Review {n} ({suffix})"),
            Section::ClaudeReview(n, None) => format!("Claude Review {n}"),
            Section::CodexIteration(n) => format!("Codex Iteration {n}"),
            Section::ClaudeEval => "Claude Eval".to_string(),
            Section::Generic(label) => label.clone(),
        }
    }

    fn phase(&self) -> Phase {
        match self {
            Section::TaskIteration(_) => Phase::Task,
            Section::ClaudeReview(..) => Phase::Review,
            Section::CodexIteration(_) => Phase::Codex,
            Section::ClaudeEval => Phase::ClaudeEval,
            Section::Generic(label) => Phase::from_section_label(label, Phase::Task),
        }
    }
}

/// The capability set a runner depends on (spec §9): {SetPhase, Print,
/// PrintRaw, PrintAligned, PrintSection, Path}. No virtual dispatch beyond
/// these six operations.
pub trait ProgressLogger: Send + Sync {
    fn set_phase(&self, phase: Phase);
    fn print(&self, text: &str);
    fn print_raw(&self, text: &str);
    fn print_aligned(&self, text: &str);
    fn print_section(&self, section: Section);
    fn path(&self) -> &Path;
}

/// Writes the on-disk progress-file format (spec §6) and nothing else.
pub struct FileLogger {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl FileLogger {
    pub fn create(path: PathBuf, plan_path: &str, branch: &str, mode: &str) -> Result<FileLogger, LoggerError> {
        let mut file = std::fs::File::create(&path).map_err(|source| LoggerError::Open {
            path: path.clone(),
            source,
        })?;
        let header = format!(
            "# Ralphex Progress Log\nPlan: {plan_path}\nBranch: {branch}\nMode: {mode}\nStarted: {}\n{}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            "-".repeat(60),
        );
        file.write_all(header.as_bytes()).map_err(|source| LoggerError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(FileLogger {
            path,
            file: Mutex::new(file),
        })
    }

    fn append(&self, line: &str) {
        let mut file = self.file.lock().unwrap();
        let _ = writeln!(file, "{line}");
    }

    fn timestamp_prefix(&self) -> String {
        Utc::now().format("[%y-%m-%d %H:%M:%S] ").to_string()
    }
}

impl ProgressLogger for FileLogger {
    fn set_phase(&self, _phase: Phase) {
        // The on-disk format has no phase marker of its own; phase is
        // always re-derived from the most recent section label on replay.
    }

    fn print(&self, text: &str) {
        let mut line = self.timestamp_prefix();
        let _ = write!(line, "{text}");
        self.append(&line);
    }

    fn print_raw(&self, text: &str) {
        self.append(text);
    }

    fn print_aligned(&self, text: &str) {
        let mut line = self.timestamp_prefix();
        let _ = write!(line, "{text}");
        self.append(&line);
    }

    fn print_section(&self, section: Section) {
        self.append(&format!("--- {} ---", section.label()));
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

struct BoundaryState {
    phase: Phase,
    active_task: Option<u32>,
}

/// Decorates a [`ProgressLogger`]: every call is forwarded unchanged (so the
/// on-disk file is identical to what a plain [`FileLogger`] would write,
/// guaranteeing cold-replay parity) and additionally translated into typed
/// [`Event`]s published to `session` (spec §4.9).
pub struct BroadcastLogger<L: ProgressLogger> {
    inner: L,
    session: Arc<Session>,
    state: Mutex<BoundaryState>,
}

impl<L: ProgressLogger> BroadcastLogger<L> {
    pub fn new(inner: L, session: Arc<Session>) -> BroadcastLogger<L> {
        BroadcastLogger {
            inner,
            session,
            state: Mutex::new(BoundaryState {
                phase: Phase::Task,
                active_task: None,
            }),
        }
    }

    fn publish(&self, event: Event) {
        self.session.publish(event);
    }

    fn current_phase(&self) -> Phase {
        self.state.lock().unwrap().phase
    }
}

impl<L: ProgressLogger> ProgressLogger for BroadcastLogger<L> {
    fn set_phase(&self, phase: Phase) {
        self.inner.set_phase(phase);

        let mut state = self.state.lock().unwrap();
        if state.phase == Phase::Task && phase != Phase::Task {
            if let Some(task_num) = state.active_task.take() {
                let event = Event::TaskEnd {
                    phase: Phase::Task,
                    task_num,
                    timestamp: Utc::now(),
                };
                drop(state);
                self.publish(event);
                state = self.state.lock().unwrap();
            }
        }
        state.phase = phase;
    }

    fn print(&self, text: &str) {
        self.inner.print(text);
        self.publish(Event::Output {
            phase: self.current_phase(),
            text: text.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn print_raw(&self, text: &str) {
        self.inner.print_raw(text);
        self.publish(Event::Output {
            phase: self.current_phase(),
            text: text.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn print_aligned(&self, text: &str) {
        self.inner.print_aligned(text);
        let phase = self.current_phase();
        let timestamp = Utc::now();
        self.publish(Event::Output {
            phase,
            text: text.to_string(),
            timestamp,
        });
        if let Some(signal) = extract_signal_marker(text) {
            self.publish(Event::Signal { phase, signal, timestamp });
        }
    }

    fn print_section(&self, section: Section) {
        self.inner.print_section(section.clone());

        let phase = section.phase();
        let timestamp = Utc::now();
        let mut state = self.state.lock().unwrap();

        match &section {
            Section::TaskIteration(n) => {
                if let Some(prev) = state.active_task.take() {
                    drop(state);
                    self.publish(Event::TaskEnd {
                        phase: Phase::Task,
                        task_num: prev,
                        timestamp,
                    });
                    state = self.state.lock().unwrap();
                }
                state.active_task = Some(*n);
                state.phase = phase;
                drop(state);
                self.publish(Event::TaskStart {
                    phase,
                    task_num: *n,
                    timestamp,
                });
            }
            Section::ClaudeReview(n, _) | Section::CodexIteration(n) => {
                state.phase = phase;
                drop(state);
                self.publish(Event::IterationStart {
                    phase,
                    iteration_num: *n,
                    timestamp,
                });
            }
            Section::ClaudeEval | Section::Generic(_) => {
                state.phase = phase;
            }
        }

        self.publish(Event::Section {
            phase,
            section: section.label(),
            timestamp,
        });
    }

    fn path(&self) -> &Path {
        self.inner.path()
    }
}

fn extract_signal_marker(text: &str) -> Option<Signal> {
    let start = text.find("<<<RALPHEX:")?;
    let rest = &text[start + "<<<RALPHEX:".len()..];
    let end = rest.find(">>>")?;
    Signal::from_marker_name(&rest[..end])
}
