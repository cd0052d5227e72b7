//! Crawl progress observation
//!
//! The engine reports progress through an injected `CrawlObserver` rather
//! than logging directly, so embedders and tests can consume a structured
//! event stream. `TracingObserver` is the production implementation and
//! maps events onto the `tracing` macros.

use std::sync::Mutex;

/// A structured progress event emitted by the crawl engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    /// A run began frontier work from its seed
    RunStarted { run_id: i64, seed_url: String },

    /// A page was dequeued and its fetch is starting
    PageStarted { url: String, depth: u32 },

    /// A page was fetched, parsed, and persisted as Completed
    PageCompleted { url: String },

    /// A page failed to fetch and was persisted as Failed
    PageFailed { url: String, reason: String },

    /// A discovered link passed all checks and entered the frontier
    LinkQueued { url: String, depth: u32 },

    /// The run ended normally (frontier exhausted, limit, or cancellation)
    RunFinished { run_id: i64, pages_crawled: u32 },

    /// The run was aborted by an unexpected error; the seed is Failed
    RunAborted { run_id: i64, error: String },
}

/// Receives crawl engine events
///
/// Implementations must be cheap and non-blocking; the engine calls them
/// inline from its loop.
pub trait CrawlObserver: Send + Sync {
    fn on_event(&self, event: CrawlEvent);
}

/// Forwards events to the `tracing` subscriber
pub struct TracingObserver;

impl CrawlObserver for TracingObserver {
    fn on_event(&self, event: CrawlEvent) {
        match event {
            CrawlEvent::RunStarted { run_id, seed_url } => {
                tracing::info!("Starting crawl run {} from {}", run_id, seed_url);
            }
            CrawlEvent::PageStarted { url, depth } => {
                tracing::info!("Processing {} (depth {})", url, depth);
            }
            CrawlEvent::PageCompleted { url } => {
                tracing::info!("Completed {}", url);
            }
            CrawlEvent::PageFailed { url, reason } => {
                tracing::warn!("Failed {}: {}", url, reason);
            }
            CrawlEvent::LinkQueued { url, depth } => {
                tracing::debug!("Queued {} (depth {})", url, depth);
            }
            CrawlEvent::RunFinished {
                run_id,
                pages_crawled,
            } => {
                tracing::info!("Crawl run {} finished: {} pages crawled", run_id, pages_crawled);
            }
            CrawlEvent::RunAborted { run_id, error } => {
                tracing::error!("Crawl run {} aborted: {}", run_id, error);
            }
        }
    }
}

/// Collects events in memory, for tests and diagnostics
#[derive(Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<CrawlEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the events observed so far
    pub fn events(&self) -> Vec<CrawlEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl CrawlObserver for CollectingObserver {
    fn on_event(&self, event: CrawlEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_observer_records_in_order() {
        let observer = CollectingObserver::new();
        observer.on_event(CrawlEvent::RunStarted {
            run_id: 1,
            seed_url: "https://x.test/".to_string(),
        });
        observer.on_event(CrawlEvent::PageCompleted {
            url: "https://x.test/".to_string(),
        });

        let events = observer.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], CrawlEvent::RunStarted { run_id: 1, .. }));
        assert!(matches!(events[1], CrawlEvent::PageCompleted { .. }));
    }
}
