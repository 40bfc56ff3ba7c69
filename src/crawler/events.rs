//! Structured progress events emitted while crawling.

use std::sync::Mutex;
use std::time::Duration;

use crate::models::SortOrder;

/// Something observable that happened during a crawl
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    /// The count probe returned the reported total
    ProbeCompleted { session: String, total: u64 },

    /// A page was fetched, extracted and persisted
    PageFetched {
        session: String,
        order: SortOrder,
        offset: usize,
        received: usize,
        accumulated: usize,
        target: usize,
    },

    /// An entry was dropped under the skip policy
    EntrySkipped {
        session: String,
        id_url: String,
        reason: String,
    },

    /// A transient failure is about to be retried
    Retrying {
        query: String,
        start: usize,
        attempt: u32,
        delay: Duration,
        error: String,
    },

    /// A pass reached its target
    PassCompleted {
        session: String,
        order: SortOrder,
        retrieved: usize,
        target: usize,
        skipped: usize,
    },

    /// A pass gave up after too many empty pages
    PassExhausted {
        session: String,
        order: SortOrder,
        retrieved: usize,
        target: usize,
    },
}

/// Receiver of crawl events
pub trait EventSink: Send + Sync + std::fmt::Debug {
    fn emit(&self, event: &CrawlEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl EventSink for TracingEvents {
    fn emit(&self, event: &CrawlEvent) {
        match event {
            CrawlEvent::ProbeCompleted { session, total } => {
                tracing::info!(session = %session, total, "probe completed");
            }
            CrawlEvent::PageFetched {
                session,
                order,
                offset,
                received,
                accumulated,
                target,
            } => {
                tracing::info!(
                    session = %session,
                    order = %order,
                    offset,
                    received,
                    accumulated,
                    target,
                    "page fetched"
                );
            }
            CrawlEvent::EntrySkipped {
                session,
                id_url,
                reason,
            } => {
                tracing::warn!(session = %session, id_url = %id_url, "skipped entry: {}", reason);
            }
            CrawlEvent::Retrying {
                query,
                start,
                attempt,
                delay,
                error,
            } => {
                tracing::warn!(
                    query = %query,
                    start,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after: {}",
                    error
                );
            }
            CrawlEvent::PassCompleted {
                session,
                order,
                retrieved,
                target,
                skipped,
            } => {
                tracing::info!(
                    session = %session,
                    order = %order,
                    retrieved,
                    target,
                    skipped,
                    "pass completed"
                );
            }
            CrawlEvent::PassExhausted {
                session,
                order,
                retrieved,
                target,
            } => {
                tracing::warn!(
                    session = %session,
                    order = %order,
                    retrieved,
                    target,
                    "pass exhausted before reaching target"
                );
            }
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<CrawlEvent>>,
}

impl RecordingEvents {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far
    pub fn events(&self) -> Vec<CrawlEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for RecordingEvents {
    fn emit(&self, event: &CrawlEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_events_keeps_order() {
        let sink = RecordingEvents::new();
        sink.emit(&CrawlEvent::ProbeCompleted {
            session: "cs.CR".into(),
            total: 10,
        });
        sink.emit(&CrawlEvent::PassCompleted {
            session: "cs.CR".into(),
            order: SortOrder::Ascending,
            retrieved: 10,
            target: 10,
            skipped: 0,
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], CrawlEvent::ProbeCompleted { total: 10, .. }));
    }
}
