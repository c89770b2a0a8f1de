//! Background sampling sessions for PROFILE tracepoints.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use smol_str::SmolStr;
use tracing::warn;

use crate::clock::Clock;
use crate::error::EngineError;
use crate::event::{Event, EventSink, StackFrameSummary};
use crate::frame::Frame;
use crate::settings::EngineSettings;

/// Launches and owns sampling threads. Each session is bound to the
/// call stack that triggered it and runs fully decoupled from the
/// interception hot path; it never re-enters the dispatcher.
#[derive(Default)]
pub struct ProfilingCoordinator {
    sessions: Mutex<Vec<JoinHandle<()>>>,
    stop: Arc<AtomicBool>,
}

impl ProfilingCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a sampling session for the given tracepoints. Spawn
    /// failure is reported to the sink as a degraded-capability event
    /// instead of being raised into the observed program.
    pub fn start(
        &self,
        frame: Arc<Frame>,
        thread_id: u64,
        tracepoint_ids: Vec<SmolStr>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        settings: &EngineSettings,
    ) {
        if tracepoint_ids.is_empty() {
            return;
        }
        let interval = Duration::from_millis(settings.profile_sample_interval_ms);
        let max_samples = settings.profile_max_samples;
        let stop = Arc::clone(&self.stop);
        let ids = tracepoint_ids.clone();
        let session_sink = Arc::clone(&sink);
        let session_clock = Arc::clone(&clock);
        let spawned = thread::Builder::new()
            .name(format!("linetap-profile-{thread_id}"))
            .spawn(move || {
                sample_loop(
                    frame.as_ref(),
                    &ids,
                    &*session_sink,
                    &*session_clock,
                    interval,
                    max_samples,
                    &stop,
                );
            });
        match spawned {
            Ok(handle) => {
                let mut sessions = self.sessions.lock().expect("profiler lock poisoned");
                sessions.retain(|session| !session.is_finished());
                sessions.push(handle);
            }
            Err(err) => {
                let error = EngineError::ThreadSpawn(SmolStr::new(err.to_string()));
                warn!(%error, "profiling session failed to start");
                let now = clock.now_ms();
                for id in tracepoint_ids {
                    let mut event = Event::new(id, now);
                    event.tags.error = Some(error.to_string());
                    sink.send(event);
                }
            }
        }
    }

    /// Number of session handles currently held. Finished sessions are
    /// pruned on the next `start`, so this tracks live sampling threads
    /// up to that lag.
    #[must_use]
    pub fn session_count(&self) -> usize {
        let sessions = self.sessions.lock().expect("profiler lock poisoned");
        sessions.len()
    }

    /// Signal all sessions to stop and wait for them to exit.
    pub fn stop_all(&self) {
        self.stop.store(true, Ordering::Relaxed);
        let handles = {
            let mut sessions = self.sessions.lock().expect("profiler lock poisoned");
            std::mem::take(&mut *sessions)
        };
        for handle in handles {
            let _ = handle.join();
        }
        self.stop.store(false, Ordering::Relaxed);
    }
}

fn sample_loop(
    frame: &Frame,
    tracepoint_ids: &[SmolStr],
    sink: &dyn EventSink,
    clock: &dyn Clock,
    interval: Duration,
    max_samples: u64,
    stop: &AtomicBool,
) {
    let stack = stack_summaries(frame);
    for _ in 0..max_samples {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        thread::sleep(interval);
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let now = clock.now_ms();
        for id in tracepoint_ids {
            let mut event = Event::new(id.clone(), now);
            event.stack = stack.clone();
            sink.send(event);
        }
    }
}

fn stack_summaries(frame: &Frame) -> Vec<StackFrameSummary> {
    let mut stack = Vec::new();
    let mut current = Some(frame);
    while let Some(frame) = current {
        stack.push(StackFrameSummary {
            file: frame.file.clone(),
            function: frame.function.clone(),
            line: frame.line,
        });
        current = frame.caller.as_deref();
    }
    stack
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::event::BufferSink;

    fn short_session_settings() -> EngineSettings {
        let mut settings = EngineSettings::default();
        settings.profile_sample_interval_ms = 1;
        settings.profile_max_samples = 1;
        settings
    }

    #[test]
    fn finished_sessions_are_pruned_on_start() {
        let coordinator = ProfilingCoordinator::new();
        let sink = Arc::new(BufferSink::new());
        let clock = Arc::new(ManualClock::new());
        let settings = short_session_settings();

        for _ in 0..20 {
            coordinator.start(
                Arc::new(Frame::new("views.py", "handle", 10)),
                1,
                vec![SmolStr::new("prof")],
                sink.clone(),
                clock.clone(),
                &settings,
            );
            // One-sample sessions exit on their own well within this.
            std::thread::sleep(Duration::from_millis(20));
        }

        // Handles from exited sessions must not pile up across starts.
        assert!(coordinator.session_count() <= 2);
        coordinator.stop_all();
        assert_eq!(coordinator.session_count(), 0);
        assert!(!sink.drain_events().is_empty());
    }
}
