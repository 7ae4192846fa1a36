//! Pure line classifier for the Ralphex progress-file format (spec §4.1, §6).
//!
//! `parse_line` has no I/O and no hidden state: the caller threads the
//! `in_header` flag itself, so the same function drives both the live
//! [`crate::tailer::Tailer`] and a one-shot cold-replay loop with identical
//! results (the replay-parity property in spec §8).

use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::event::{Phase, Signal};

static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^---\s+(.+?)\s+---$").unwrap());
static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(\d{2}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})\]\s*(.*)$").unwrap());
static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-{3,}$").unwrap());
static SIGNAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<<<RALPHEX:([A-Z_]+)>>>").unwrap());

/// The kind of timestamped/plain payload a line carries, mirroring
/// [`crate::event::Event`]'s variants but without the phase/timestamp that
/// only the caller (which tracks the running phase) can supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Output,
    Error,
    Warn,
    Signal(Signal),
}

/// The classification of one progress-file line, pure output of [`parse_line`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// Part of the header, or a bare separator line. Produces no event.
    Skip,
    /// A `--- Label ---` section marker.
    Section { label: String, phase: Phase },
    /// A `[YY-MM-DD HH:MM:SS] payload` line.
    Timestamped {
        kind: LineKind,
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// Any other non-empty body line.
    Plain { text: String },
}

/// Classify one line of a progress file.
///
/// `in_header` is the caller-owned state threaded across calls: `true` until
/// the header-terminating separator (a run of three or more `-` with no
/// interior text) is seen. Returns the classification and the `in_header`
/// value to use for the *next* line.
pub fn parse_line(line: &str, in_header: bool, previous_phase: Phase) -> (ParsedLine, bool) {
    if in_header {
        if SEPARATOR_RE.is_match(line) {
            return (ParsedLine::Skip, false);
        }
        return (ParsedLine::Skip, true);
    }

    if let Some(caps) = SECTION_RE.captures(line) {
        let label = caps[1].to_string();
        let phase = Phase::from_section_label(&label, previous_phase);
        return (ParsedLine::Section { label, phase }, false);
    }

    if let Some(caps) = TIMESTAMP_RE.captures(line) {
        let raw_ts = &caps[1];
        let payload = caps[2].trim().to_string();
        let timestamp = parse_two_digit_year_timestamp(raw_ts).unwrap_or_else(Utc::now);
        let kind = classify_payload(&payload);
        return (
            ParsedLine::Timestamped {
                kind,
                text: payload,
                timestamp,
            },
            false,
        );
    }

    if SEPARATOR_RE.is_match(line) {
        return (ParsedLine::Skip, in_header);
    }

    if line.is_empty() {
        return (ParsedLine::Skip, false);
    }

    (
        ParsedLine::Plain {
            text: line.to_string(),
        },
        false,
    )
}

fn classify_payload(payload: &str) -> LineKind {
    if payload.starts_with("ERROR:") {
        return LineKind::Error;
    }
    if payload.starts_with("WARN:") {
        return LineKind::Warn;
    }
    if let Some(caps) = SIGNAL_RE.captures(payload) {
        if let Some(signal) = Signal::from_marker_name(&caps[1]) {
            return LineKind::Signal(signal);
        }
    }
    LineKind::Output
}

/// Parse a `YY-MM-DD HH:MM:SS` stamp (two-digit year, 2000+year) as local
/// time and normalize to UTC.
pub fn parse_two_digit_year_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%y-%m-%d %H:%M:%S").ok()?;
    match Local.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        chrono::LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        chrono::LocalResult::None => None,
    }
}
