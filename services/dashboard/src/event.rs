//! The typed, JSON-serializable record of one occurrence inside a monitored run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse execution stage used to color and filter events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Task,
    Review,
    Codex,
    ClaudeEval,
}

impl Phase {
    /// Derive a phase from a case-insensitive keyword match on a section label,
    /// falling back to `previous` when no keyword matches.
    pub fn from_section_label(label: &str, previous: Phase) -> Phase {
        let lower = label.to_lowercase();
        if lower.contains("codex") {
            Phase::Codex
        } else if lower.contains("claude-eval") {
            Phase::ClaudeEval
        } else if lower.contains("review") {
            Phase::Review
        } else if lower.contains("task") {
            Phase::Task
        } else {
            previous
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Task => "task",
            Phase::Review => "review",
            Phase::Codex => "codex",
            Phase::ClaudeEval => "claude-eval",
        };
        f.write_str(s)
    }
}

/// A terminal or phase-ending marker embedded in run output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Completed,
    Failed,
    ReviewDone,
    CodexReviewDone,
}

impl Signal {
    /// Normalize a `<<<RALPHEX:NAME>>>` marker name to its emitted signal, if any.
    pub fn from_marker_name(name: &str) -> Option<Signal> {
        match name {
            "ALL_TASKS_DONE" => Some(Signal::Completed),
            "FAILED" => Some(Signal::Failed),
            "REVIEW_DONE" => Some(Signal::ReviewDone),
            "CODEX_REVIEW_DONE" => Some(Signal::CodexReviewDone),
            _ => None,
        }
    }

    /// Only `COMPLETED` and `FAILED` are terminal for dashboard badge purposes;
    /// `REVIEW_DONE` and `CODEX_REVIEW_DONE` are informational phase signals.
    pub fn is_terminal(self) -> bool {
        matches!(self, Signal::Completed | Signal::Failed)
    }
}

/// One occurrence in a monitored run's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Output {
        phase: Phase,
        text: String,
        timestamp: DateTime<Utc>,
    },
    Section {
        phase: Phase,
        section: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        phase: Phase,
        text: String,
        timestamp: DateTime<Utc>,
    },
    Warn {
        phase: Phase,
        text: String,
        timestamp: DateTime<Utc>,
    },
    Signal {
        phase: Phase,
        signal: Signal,
        timestamp: DateTime<Utc>,
    },
    TaskStart {
        phase: Phase,
        task_num: u32,
        timestamp: DateTime<Utc>,
    },
    TaskEnd {
        phase: Phase,
        task_num: u32,
        timestamp: DateTime<Utc>,
    },
    IterationStart {
        phase: Phase,
        iteration_num: u32,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn phase(&self) -> Phase {
        match self {
            Event::Output { phase, .. }
            | Event::Section { phase, .. }
            | Event::Error { phase, .. }
            | Event::Warn { phase, .. }
            | Event::Signal { phase, .. }
            | Event::TaskStart { phase, .. }
            | Event::TaskEnd { phase, .. }
            | Event::IterationStart { phase, .. } => *phase,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Output { timestamp, .. }
            | Event::Section { timestamp, .. }
            | Event::Error { timestamp, .. }
            | Event::Warn { timestamp, .. }
            | Event::Signal { timestamp, .. }
            | Event::TaskStart { timestamp, .. }
            | Event::TaskEnd { timestamp, .. }
            | Event::IterationStart { timestamp, .. } => *timestamp,
        }
    }

    /// Whether this event should flip the dashboard's terminal badge for its session.
    pub fn is_terminal_signal(&self) -> bool {
        matches!(self, Event::Signal { signal, .. } if signal.is_terminal())
    }

    /// Projection used to compare live-tail and cold-replay event sequences (spec §8),
    /// ignoring the live path's wall-clock timestamps on synthesized events.
    pub fn replay_projection(&self) -> ReplayProjection {
        ReplayProjection {
            kind: std::mem::discriminant(self),
            phase: self.phase(),
            text: match self {
                Event::Output { text, .. } | Event::Error { text, .. } | Event::Warn { text, .. } => {
                    Some(text.clone())
                }
                _ => None,
            },
            section: match self {
                Event::Section { section, .. } => Some(section.clone()),
                _ => None,
            },
            signal: match self {
                Event::Signal { signal, .. } => Some(*signal),
                _ => None,
            },
            task_num: match self {
                Event::TaskStart { task_num, .. } | Event::TaskEnd { task_num, .. } => Some(*task_num),
                _ => None,
            },
            iteration_num: match self {
                Event::IterationStart { iteration_num, .. } => Some(*iteration_num),
                _ => None,
            },
            timestamp_to_the_second: self.timestamp().timestamp(),
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct ReplayProjection {
    kind: std::mem::Discriminant<Event>,
    phase: Phase,
    text: Option<String>,
    section: Option<String>,
    signal: Option<Signal>,
    task_num: Option<u32>,
    iteration_num: Option<u32>,
    timestamp_to_the_second: i64,
}
