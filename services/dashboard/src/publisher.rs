//! Per-session SSE fan-out: subscribe/unsubscribe, non-blocking broadcast,
//! and slow-consumer handling (spec §4.3).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::Event;

const DEFAULT_MAX_CLIENTS: usize = 100;
const DEFAULT_CLIENT_BUFFER: usize = 256;
const DROP_WARN_EVERY: u64 = 100;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PublisherError {
    #[error("maximum number of subscribers exceeded")]
    MaxClientsExceeded,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Event>,
}

struct Inner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// Bounded, non-blocking fan-out of one session's events to any number of
/// SSE handlers. A slow client's buffer fills and further events are
/// dropped *for that client only*; other subscribers are unaffected.
pub struct SsePublisher {
    max_clients: usize,
    client_buffer: usize,
    inner: Mutex<Inner>,
    dropped: AtomicU64,
}

/// A live subscription: a receiver plus the id needed to unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<Event>,
}

impl SsePublisher {
    pub fn new(max_clients: usize, client_buffer: usize) -> SsePublisher {
        SsePublisher {
            max_clients,
            client_buffer,
            inner: Mutex::new(Inner {
                next_id: 0,
                subscribers: Vec::new(),
            }),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> Result<Subscription, PublisherError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.subscribers.len() >= self.max_clients {
            return Err(PublisherError::MaxClientsExceeded);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        let (tx, rx) = mpsc::channel(self.client_buffer.max(1));
        inner.subscribers.push(Subscriber { id, tx });
        Ok(Subscription { id, rx })
    }

    /// Idempotent: removing an id that is not (or no longer) present is a no-op.
    pub fn unsubscribe(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.subscribers.retain(|s| s.id != id);
    }

    /// Send to every subscriber without blocking. A full subscriber buffer
    /// drops this event for that subscriber only.
    pub fn broadcast(&self, event: Event) {
        let inner = self.inner.lock().unwrap();
        for sub in &inner.subscribers {
            if sub.tx.try_send(event.clone()).is_err() {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if total % DROP_WARN_EVERY == 0 {
                    tracing::warn!(dropped_total = total, "SSE subscriber buffer full, dropping event");
                }
            }
        }
    }

    pub fn client_count(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close all subscriber channels and clear the subscriber set.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.subscribers.clear();
    }
}

impl Default for SsePublisher {
    fn default() -> SsePublisher {
        SsePublisher::new(DEFAULT_MAX_CLIENTS, DEFAULT_CLIENT_BUFFER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Phase;
    use chrono::Utc;

    fn output(n: usize) -> Event {
        Event::Output {
            phase: Phase::Task,
            text: n.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn subscribe_beyond_max_clients_is_rejected_then_succeeds_after_unsubscribe() {
        let pub_ = SsePublisher::new(1, 8);
        let first = pub_.subscribe().unwrap();
        assert_eq!(pub_.subscribe().unwrap_err(), PublisherError::MaxClientsExceeded);
        pub_.unsubscribe(first.id);
        assert!(pub_.subscribe().is_ok());
    }

    #[test]
    fn broadcast_does_not_block_on_full_subscriber_and_counts_drops() {
        let pub_ = SsePublisher::new(10, 256);
        let mut sub = pub_.subscribe().unwrap();
        for i in 0..512 {
            pub_.broadcast(output(i));
        }

        let mut received = 0;
        while sub.rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 256);
        assert_eq!(pub_.dropped_events(), 256);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let pub_ = SsePublisher::default();
        let sub = pub_.subscribe().unwrap();
        pub_.unsubscribe(sub.id);
        pub_.unsubscribe(sub.id);
        assert_eq!(pub_.client_count(), 0);
    }

    #[test]
    fn close_clears_all_subscribers() {
        let pub_ = SsePublisher::default();
        let _a = pub_.subscribe().unwrap();
        let _b = pub_.subscribe().unwrap();
        pub_.close();
        assert_eq!(pub_.client_count(), 0);
    }

    #[test]
    fn drop_is_isolated_to_the_slow_subscriber() {
        let pub_ = SsePublisher::new(10, 4);
        let slow = pub_.subscribe().unwrap();
        let mut fast = pub_.subscribe().unwrap();
        for i in 0..20 {
            pub_.broadcast(output(i));
            let _ = fast.rx.try_recv();
        }
        drop(slow);
        assert!(pub_.dropped_events() > 0);
    }
}
