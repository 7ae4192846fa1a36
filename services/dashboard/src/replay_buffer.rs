//! A bounded ring of [`Event`]s per session, supporting full chronological
//! replay and phase-filtered retrieval (spec §4.2).

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::event::{Event, Phase};

const DEFAULT_CAPACITY: usize = 10_000;

struct Inner {
    capacity: usize,
    events: VecDeque<Event>,
}

/// Thread-safe bounded ring buffer of events.
pub struct ReplayBuffer {
    inner: Mutex<Inner>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> ReplayBuffer {
        ReplayBuffer {
            inner: Mutex::new(Inner {
                capacity: capacity.max(1),
                events: VecDeque::with_capacity(capacity.min(4096)),
            }),
        }
    }

    /// Append an event, overwriting the oldest one if the buffer is full.
    pub fn add(&self, event: Event) {
        let mut inner = self.inner.lock().unwrap();
        if inner.events.len() >= inner.capacity {
            inner.events.pop_front();
        }
        inner.events.push_back(event);
    }

    /// All buffered events, in chronological (insertion) order.
    pub fn all(&self) -> Vec<Event> {
        let inner = self.inner.lock().unwrap();
        inner.events.iter().cloned().collect()
    }

    /// Buffered events for one phase, in chronological order.
    pub fn by_phase(&self, phase: Phase) -> Vec<Event> {
        let inner = self.inner.lock().unwrap();
        inner.events.iter().filter(|e| e.phase() == phase).cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().events.clear();
    }
}

impl Default for ReplayBuffer {
    fn default() -> ReplayBuffer {
        ReplayBuffer::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn output(phase: Phase, text: &str) -> Event {
        Event::Output {
            phase,
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn count_never_exceeds_capacity() {
        let buf = ReplayBuffer::new(3);
        for i in 0..10 {
            buf.add(output(Phase::Task, &i.to_string()));
        }
        assert_eq!(buf.count(), 3);
    }

    #[test]
    fn all_is_a_suffix_of_the_add_sequence() {
        let buf = ReplayBuffer::new(3);
        for i in 0..5 {
            buf.add(output(Phase::Task, &i.to_string()));
        }
        let all = buf.all();
        let texts: Vec<&str> = all
            .iter()
            .map(|e| match e {
                Event::Output { text, .. } => text.as_str(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(texts, vec!["2", "3", "4"]);
    }

    #[test]
    fn overflow_by_one_evicts_exactly_the_oldest() {
        let buf = ReplayBuffer::new(2);
        buf.add(output(Phase::Task, "a"));
        buf.add(output(Phase::Task, "b"));
        buf.add(output(Phase::Task, "c"));
        let all = buf.all();
        assert_eq!(all.len(), 2);
        match (&all[0], &all[1]) {
            (Event::Output { text: a, .. }, Event::Output { text: b, .. }) => {
                assert_eq!(a, "b");
                assert_eq!(b, "c");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn by_phase_stays_consistent_with_count_after_overwrite() {
        let buf = ReplayBuffer::new(4);
        buf.add(output(Phase::Task, "1"));
        buf.add(output(Phase::Review, "2"));
        buf.add(output(Phase::Task, "3"));
        buf.add(output(Phase::Codex, "4"));
        buf.add(output(Phase::Task, "5")); // evicts "1" (task)

        let sum: usize = [Phase::Task, Phase::Review, Phase::Codex, Phase::ClaudeEval]
            .iter()
            .map(|p| buf.by_phase(*p).len())
            .sum();
        assert_eq!(sum, buf.count());
        assert_eq!(buf.by_phase(Phase::Task).len(), 2);
    }

    #[test]
    fn clear_empties_the_buffer() {
        let buf = ReplayBuffer::new(4);
        buf.add(output(Phase::Task, "1"));
        buf.clear();
        assert_eq!(buf.count(), 0);
        assert!(buf.all().is_empty());
    }
}
