//! Progress-callback trait for per-item batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the batch runner works through its items.
//!
//! The runner is strictly sequential, so callbacks are never invoked
//! concurrently; the trait is still `Send + Sync` so implementations can be
//! shared with other tasks (a terminal progress bar, a status endpoint).
//!
//! # Example
//!
//! ```rust
//! use pagescribe::{BatchConfig, BatchProgress, BatchProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl BatchProgressCallback for Printer {
//!     fn on_item_start(&self, progress: BatchProgress, label: &str) {
//!         eprintln!("[{}/{}] {}", progress.index + 1, progress.total, label);
//!     }
//! }
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::batch::BatchReport;
use crate::error::ItemError;
use crate::usage::UsageTotals;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Position of the current item within the batch (`0 ≤ index < total`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub index: usize,
    pub total: usize,
}

impl BatchProgress {
    /// 1-based position, for display.
    pub fn ordinal(&self) -> usize {
        self.index + 1
    }
}

/// Called by the batch runner as it processes each item.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first item starts.
    fn on_batch_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called just before the external collaborator is invoked for an item.
    fn on_item_start(&self, progress: BatchProgress, label: &str) {
        let _ = (progress, label);
    }

    /// Called after an item's output has been persisted.
    ///
    /// # Arguments
    /// * `elapsed`  — time spent in the external call (excludes the write)
    /// * `totals`   — cumulative usage including this item
    /// * `cost_usd` — cumulative estimated cost including this item
    fn on_item_complete(
        &self,
        progress: BatchProgress,
        label: &str,
        elapsed: Duration,
        totals: &UsageTotals,
        cost_usd: f64,
    ) {
        let _ = (progress, label, elapsed, totals, cost_usd);
    }

    /// Called when an item fails, before the continue/abort decision.
    fn on_item_error(&self, progress: BatchProgress, label: &str, error: &ItemError) {
        let _ = (progress, label, error);
    }

    /// Called once when every item has been attempted without an abort.
    fn on_batch_complete(&self, report: &BatchReport) {
        let _ = report;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_item_start(&self, _progress: BatchProgress, _label: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_complete(
            &self,
            _progress: BatchProgress,
            _label: &str,
            _elapsed: Duration,
            _totals: &UsageTotals,
            _cost_usd: f64,
        ) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_error(&self, _progress: BatchProgress, _label: &str, _error: &ItemError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let p = BatchProgress { index: 0, total: 2 };
        cb.on_batch_start(2);
        cb.on_item_start(p, "pages 1-5");
        cb.on_item_complete(p, "pages 1-5", Duration::from_millis(5), &UsageTotals::default(), 0.0);
        cb.on_item_error(p, "pages 6-7", &ItemError::external("pages 6-7", "boom"));
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        let p = BatchProgress { index: 1, total: 3 };
        tracker.on_item_start(p, "a");
        tracker.on_item_complete(p, "a", Duration::ZERO, &UsageTotals::default(), 0.0);
        tracker.on_item_start(p, "b");
        tracker.on_item_error(p, "b", &ItemError::external("b", "timeout"));

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(p.ordinal(), 2);
    }
}
