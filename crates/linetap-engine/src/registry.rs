//! Atomically swappable tracepoint registry.
//!
//! The active set is an immutable index behind an `Arc`; replacement
//! swaps the pointer so readers always observe a complete set and never
//! block behind a writer building the next one. The hot path checks a
//! relaxed counter first so an empty registry costs no lock at all.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::error::EngineError;
use crate::settings::EngineSettings;
use crate::tracepoint::{Tracepoint, TracepointDto};

/// Immutable index from source-file basename to tracepoints.
#[derive(Debug, Default)]
pub struct TracepointIndex {
    by_file: FxHashMap<SmolStr, Vec<Arc<Tracepoint>>>,
    len: usize,
}

impl TracepointIndex {
    fn build(tracepoints: Vec<Tracepoint>) -> Self {
        let len = tracepoints.len();
        let mut by_file: FxHashMap<SmolStr, Vec<Arc<Tracepoint>>> = FxHashMap::default();
        for tracepoint in tracepoints {
            by_file
                .entry(tracepoint.source_file.clone())
                .or_default()
                .push(Arc::new(tracepoint));
        }
        Self { by_file, len }
    }

    /// Tracepoints declared on a file, or empty.
    #[must_use]
    pub fn for_file(&self, file: &str) -> &[Arc<Tracepoint>] {
        self.by_file.get(file).map_or(&[], Vec::as_slice)
    }

    /// Tracepoints declared on a specific line of a file.
    pub fn for_line<'a>(
        &'a self,
        file: &str,
        line: u32,
    ) -> impl Iterator<Item = &'a Arc<Tracepoint>> {
        self.for_file(file)
            .iter()
            .filter(move |tracepoint| tracepoint.line == line)
    }

    /// Total number of installed tracepoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Current tracepoint set, replaced wholesale by the tracepoint source.
#[derive(Debug)]
pub struct TracepointRegistry {
    index: RwLock<Arc<TracepointIndex>>,
    active: AtomicUsize,
}

impl TracepointRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Arc::new(TracepointIndex::default())),
            active: AtomicUsize::new(0),
        }
    }

    /// Validate all definitions and install them as the new active set.
    /// Any validation error leaves the previous set untouched.
    pub fn replace(
        &self,
        dtos: Vec<TracepointDto>,
        settings: &EngineSettings,
    ) -> Result<usize, EngineError> {
        let mut tracepoints = Vec::with_capacity(dtos.len());
        for dto in dtos {
            tracepoints.push(Tracepoint::from_dto(dto, settings)?);
        }
        let next = Arc::new(TracepointIndex::build(tracepoints));
        let installed = next.len();
        {
            let mut index = self.index.write().expect("registry lock poisoned");
            *index = next;
        }
        self.active.store(installed, Ordering::Relaxed);
        debug!(installed, "tracepoint registry replaced");
        Ok(installed)
    }

    /// Fast path for the dispatcher: true when no tracepoint is
    /// installed, without taking the lock.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.load(Ordering::Relaxed) == 0
    }

    /// Grab the current index for one event's processing.
    #[must_use]
    pub fn load(&self) -> Arc<TracepointIndex> {
        let index = self.index.read().expect("registry lock poisoned");
        Arc::clone(&index)
    }
}

impl Default for TracepointRegistry {
    fn default() -> Self {
        Self::new()
    }
}
