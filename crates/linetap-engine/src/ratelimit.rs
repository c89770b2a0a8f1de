//! Per-tracepoint rate limiting with snapshot/commit semantics.
//!
//! The shared state is copied before a line's batch is evaluated and
//! committed back afterwards, so no lock is ever held across
//! operator-supplied expression evaluation. Within one line hit every
//! tracepoint sees the same consistent view.

#![allow(missing_docs)]

use std::sync::Mutex;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

/// Throttling state for one tracepoint id, created lazily on first hit
/// and reset wholesale on registry replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireState {
    /// Time of the last successful fire; `None` until the first one.
    pub last_fired_at_ms: Option<i64>,
    /// Hits rejected since the last successful fire.
    pub suppressed: u64,
    /// Successful fires since the last registry reset.
    pub fire_count: u64,
}

/// Decision for one candidate hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireDecision {
    /// Fire, reporting the suppressed hits accumulated in between.
    Fire { suppressed: u64 },
    /// Rejected by the rate-limit window.
    RateLimited,
    /// Rejected because the fire-count budget is exhausted.
    LimitReached,
}

#[derive(Debug, Default)]
struct SharedState {
    /// Bumped on every reset; stale snapshots must not commit.
    generation: u64,
    states: FxHashMap<SmolStr, FireState>,
}

/// Shared rate-limit state for all tracepoints.
#[derive(Debug, Default)]
pub struct RateLimiter {
    shared: Mutex<SharedState>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current state for one line hit's evaluation.
    #[must_use]
    pub fn snapshot(&self) -> RateSnapshot {
        let shared = self.shared.lock().expect("rate limiter lock poisoned");
        RateSnapshot {
            generation: shared.generation,
            states: shared.states.clone(),
        }
    }

    /// Install a snapshot as the new shared state. A snapshot taken
    /// before an intervening `reset` is discarded: committing it would
    /// resurrect the cleared history.
    pub fn commit(&self, snapshot: RateSnapshot) {
        let mut shared = self.shared.lock().expect("rate limiter lock poisoned");
        if shared.generation == snapshot.generation {
            shared.states = snapshot.states;
        }
    }

    /// Drop all state; rate-limit history never survives a registry swap.
    pub fn reset(&self) {
        let mut shared = self.shared.lock().expect("rate limiter lock poisoned");
        shared.generation += 1;
        shared.states.clear();
    }

    /// Current state for a tracepoint id, if any.
    #[must_use]
    pub fn state(&self, id: &str) -> Option<FireState> {
        let shared = self.shared.lock().expect("rate limiter lock poisoned");
        shared.states.get(id).copied()
    }
}

/// Private copy of the limiter state for one line hit.
#[derive(Debug, Clone, Default)]
pub struct RateSnapshot {
    generation: u64,
    states: FxHashMap<SmolStr, FireState>,
}

impl RateSnapshot {
    /// Decide whether a tracepoint may fire now, updating only this
    /// snapshot. `fire_count_limit = None` means unbounded.
    pub fn can_fire(
        &mut self,
        id: &SmolStr,
        now_ms: i64,
        rate_limit_ms: i64,
        fire_count_limit: Option<u64>,
    ) -> FireDecision {
        let state = self.states.entry(id.clone()).or_default();
        if let Some(limit) = fire_count_limit {
            if state.fire_count >= limit {
                return FireDecision::LimitReached;
            }
        }
        if let Some(last) = state.last_fired_at_ms {
            if now_ms.saturating_sub(last) < rate_limit_ms {
                state.suppressed = state.suppressed.saturating_add(1);
                return FireDecision::RateLimited;
            }
        }
        state.last_fired_at_ms = Some(now_ms);
        state.fire_count = state.fire_count.saturating_add(1);
        let suppressed = std::mem::take(&mut state.suppressed);
        FireDecision::Fire { suppressed }
    }
}
