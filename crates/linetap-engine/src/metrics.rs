//! Engine metrics collection.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};

/// Saturating counters for engine activity.
///
/// Updated from observed-program threads, so everything is a relaxed
/// atomic; readers take a point-in-time snapshot.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    events_emitted: AtomicU64,
    hits_suppressed: AtomicU64,
    lines_truncated: AtomicU64,
    tracepoints_skipped: AtomicU64,
    eval_errors: AtomicU64,
    deferred_dropped: AtomicU64,
}

impl EngineMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.hits_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_truncated(&self) {
        self.lines_truncated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, count: u64) {
        self.tracepoints_skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_eval_error(&self) {
        self.eval_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deferred_dropped(&self) {
        self.deferred_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            hits_suppressed: self.hits_suppressed.load(Ordering::Relaxed),
            lines_truncated: self.lines_truncated.load(Ordering::Relaxed),
            tracepoints_skipped: self.tracepoints_skipped.load(Ordering::Relaxed),
            eval_errors: self.eval_errors.load(Ordering::Relaxed),
            deferred_dropped: self.deferred_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_emitted: u64,
    pub hits_suppressed: u64,
    pub lines_truncated: u64,
    pub tracepoints_skipped: u64,
    pub eval_errors: u64,
    pub deferred_dropped: u64,
}
