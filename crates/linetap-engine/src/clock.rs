//! Engine clocks.

#![allow(missing_docs)]

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Clock interface for rate limiting and line budgets.
pub trait Clock: Send + Sync + 'static {
    /// Current time in milliseconds on a monotonic scale.
    fn now_ms(&self) -> i64;
}

/// Monotonic clock based on `std::time::Instant`.
#[derive(Debug, Clone)]
pub struct StdClock {
    start: Instant,
}

impl StdClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_ms(&self) -> i64 {
        i64::try_from(self.start.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

/// Deterministic clock for tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<Mutex<i64>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current time explicitly.
    pub fn set_ms(&self, now_ms: i64) {
        *self.now_ms.lock().expect("manual clock lock poisoned") = now_ms;
    }

    /// Advance time by the given delta.
    pub fn advance_ms(&self, delta_ms: i64) {
        let mut now = self.now_ms.lock().expect("manual clock lock poisoned");
        *now = now.saturating_add(delta_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        *self.now_ms.lock().expect("manual clock lock poisoned")
    }
}
