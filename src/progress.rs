//! Progress reporting for collection runs.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::CollectionConfigBuilder::progress_callback`] to receive
//! events as the run discovers links, renders products and assembles the
//! document.
//!
//! # Threading
//!
//! Render tasks never call the callback themselves. They publish their
//! outcome on a channel and the orchestrating task drains it, so every
//! callback method runs on one task, one event at a time. Implementations
//! still need to be `Send + Sync` because the orchestrator may move between
//! runtime worker threads.
//!
//! # Example
//!
//! ```rust
//! use collection2doc::{CollectionConfig, ProgressEvent, RunProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl RunProgressCallback for Printer {
//!     fn on_task_complete(&self, event: &ProgressEvent) {
//!         eprintln!("{}/{} {}", event.completed, event.total, event.message);
//!     }
//! }
//!
//! let config = CollectionConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One progress update: `completed` out of `total` render tasks, plus a
/// human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub message: String,
    /// Sequence index of the product this event is about, if any.
    pub index: Option<usize>,
}

impl ProgressEvent {
    pub fn new(completed: usize, total: usize, message: impl Into<String>) -> Self {
        Self {
            completed,
            total,
            message: message.into(),
            index: None,
        }
    }

    pub fn for_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Completion ratio in `0.0..=1.0`; zero when nothing was dispatched.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Called by the run as it progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait RunProgressCallback: Send + Sync {
    /// Called once before the listing page is fetched.
    fn on_run_start(&self, listing_url: &str) {
        let _ = listing_url;
    }

    /// Called once after extraction.
    ///
    /// # Arguments
    /// * `found`    — unique candidate links on the listing page
    /// * `selected` — links that will be rendered (`found` capped at `max_products`)
    fn on_links_discovered(&self, found: usize, selected: usize) {
        let _ = (found, selected);
    }

    /// Called when a product page was rendered successfully.
    fn on_task_complete(&self, event: &ProgressEvent) {
        let _ = event;
    }

    /// Called when a product page failed to render.
    fn on_task_error(&self, event: &ProgressEvent) {
        let _ = event;
    }

    /// Stage notices: truncation, failure preview, merging, transcoding.
    fn on_notice(&self, event: &ProgressEvent) {
        let _ = event;
    }

    /// Called once after the final document was produced.
    ///
    /// # Arguments
    /// * `succeeded` — products included in the document
    /// * `total`     — products dispatched
    fn on_run_complete(&self, succeeded: usize, total: usize) {
        let _ = (succeeded, total);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::CollectionConfig`].
pub type ProgressCallback = Arc<dyn RunProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl RunProgressCallback for Recorder {
        fn on_task_complete(&self, event: &ProgressEvent) {
            self.events.lock().unwrap().push(event.clone());
        }

        fn on_task_error(&self, event: &ProgressEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start("https://shop.test/collections/all");
        cb.on_links_discovered(5, 3);
        cb.on_task_complete(&ProgressEvent::new(1, 3, "ok"));
        cb.on_task_error(&ProgressEvent::new(2, 3, "failed"));
        cb.on_notice(&ProgressEvent::new(2, 3, "Merging PDFs..."));
        cb.on_run_complete(2, 3);
    }

    #[test]
    fn recorder_sees_events_in_call_order() {
        let rec = Recorder::default();
        rec.on_task_complete(&ProgressEvent::new(1, 2, "a").for_index(2));
        rec.on_task_error(&ProgressEvent::new(2, 2, "b").for_index(1));
        let events = rec.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].index, Some(2));
        assert_eq!(events[1].completed, 2);
    }

    #[test]
    fn fraction_handles_empty_total() {
        assert_eq!(ProgressEvent::new(0, 0, "").fraction(), 0.0);
        assert_eq!(ProgressEvent::new(1, 4, "").fraction(), 0.25);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_links_discovered(10, 10);
    }
}
