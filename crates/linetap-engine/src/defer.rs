//! Deferred two-phase captures.
//!
//! A tracepoint with a `data_left`/`data_right` line hook wants its
//! event finished only after the instrumented line has executed. The
//! left half is queued here per thread and completed by the next
//! interception event on the same thread whose frame signature matches.
//! Queues are FIFO: two-phase tracepoints on one thread complete in the
//! order they were entered.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

use crate::capture::{capture, CaptureOptions};
use crate::eval::{evaluate_watch, format_log_message, Evaluator};
use crate::event::Event;
use crate::frame::{Frame, FrameSignature};
use crate::hook::ExecutionEvent;
use crate::settings::EngineSettings;
use crate::tracepoint::{LineHook, Tracepoint, TracepointKind};

/// One queued left half awaiting its completion event.
#[derive(Debug, Clone)]
pub struct PendingCapture {
    /// Owning definition; kept alive here even if the registry drops it.
    pub tracepoint: Arc<Tracepoint>,
    /// Event built at the left edge of the line.
    pub left: Event,
    /// Frame signature the completion event must match.
    pub signature: FrameSignature,
}

/// Per-thread FIFO queues of pending two-phase captures.
#[derive(Debug, Default)]
pub struct DeferredCaptures {
    queues: Mutex<FxHashMap<u64, VecDeque<PendingCapture>>>,
}

impl DeferredCaptures {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a pending capture for a thread. Returns `false` when the
    /// queue was full and the oldest entry had to be dropped.
    pub fn enqueue(&self, thread_id: u64, pending: PendingCapture, cap: usize) -> bool {
        let mut queues = self.queues.lock().expect("deferred queue lock poisoned");
        let queue = queues.entry(thread_id).or_default();
        let mut kept_all = true;
        while queue.len() >= cap.max(1) {
            queue.pop_front();
            kept_all = false;
        }
        queue.push_back(pending);
        kept_all
    }

    /// Number of entries queued for a thread.
    #[must_use]
    pub fn pending_len(&self, thread_id: u64) -> usize {
        let queues = self.queues.lock().expect("deferred queue lock poisoned");
        queues.get(&thread_id).map_or(0, VecDeque::len)
    }

    /// Complete the oldest pending capture for this thread if the
    /// current frame matches its signature. A non-matching frame leaves
    /// the entry queued: the correlated continuation has not happened.
    pub fn try_complete(
        &self,
        thread_id: u64,
        event: &ExecutionEvent,
        frame: &Frame,
        now_ms: i64,
        evaluator: &dyn Evaluator,
        settings: &EngineSettings,
    ) -> Option<Event> {
        let pending = {
            let mut queues = self.queues.lock().expect("deferred queue lock poisoned");
            let queue = queues.get_mut(&thread_id)?;
            if queue.front()?.signature != frame.signature() {
                return None;
            }
            queue.pop_front()?
        };
        // Lock released: the right-side capture and watch evaluation run
        // operator expressions and must not hold queue state.
        Some(finish(pending, event, frame, now_ms, evaluator, settings))
    }
}

fn finish(
    pending: PendingCapture,
    event: &ExecutionEvent,
    frame: &Frame,
    now_ms: i64,
    evaluator: &dyn Evaluator,
    settings: &EngineSettings,
) -> Event {
    let tracepoint = pending.tracepoint;
    let mut finished = pending.left;
    finished.end_ms = now_ms;

    if tracepoint.line_hook == LineHook::DataRight {
        let opts = CaptureOptions::from_settings(
            settings,
            tracepoint.kind == TracepointKind::Stack,
            now_ms,
        );
        let right = capture(frame, now_ms, &opts);
        finished.tags.line_time_exceeded |= right.line_time_exceeded;
        // Merge: right-side values win on name collisions.
        for (name, value) in right.variables {
            finished.variables.insert(name, value);
        }
        for (name, expression) in &tracepoint.watches {
            let result = evaluate_watch(evaluator, expression, &frame.locals);
            finished.watch_results.insert(name.clone(), result);
        }
        if let Some(template) = &tracepoint.log_msg {
            let formatted = format_log_message(evaluator, template, &frame.locals);
            finished.log_message = Some(formatted.message);
            for (name, result) in formatted.fields {
                finished.watch_results.insert(name, result);
            }
        }
    }

    if let ExecutionEvent::Exception { message } = event {
        finished.tags.error = Some(message.to_string());
    }
    finished
}

#[cfg(test)]
mod tests {
    use smol_str::SmolStr;

    use super::*;
    use crate::eval::ExprEvaluator;

    fn tracepoint(hook: LineHook) -> Arc<Tracepoint> {
        use crate::tracepoint::TracepointDto;
        let dto = TracepointDto {
            id: SmolStr::new("tp1"),
            file: SmolStr::new("views.py"),
            line: 10,
            kind: SmolStr::new("LINE_FRAME"),
            ..TracepointDto::default()
        };
        let mut tp = Tracepoint::from_dto(dto, &EngineSettings::default()).unwrap();
        tp.line_hook = hook;
        Arc::new(tp)
    }

    fn pending(hook: LineHook) -> PendingCapture {
        let frame = Frame::new("views.py", "handle", 10);
        PendingCapture {
            tracepoint: tracepoint(hook),
            left: Event::new(SmolStr::new("tp1"), 5),
            signature: frame.signature(),
        }
    }

    #[test]
    fn mismatched_signature_stays_queued() {
        let deferred = DeferredCaptures::new();
        deferred.enqueue(7, pending(LineHook::DataLeft), 16);
        let other = Frame::new("views.py", "other_fn", 11);
        let settings = EngineSettings::default();
        let done = deferred.try_complete(
            7,
            &ExecutionEvent::Return,
            &other,
            9,
            &ExprEvaluator,
            &settings,
        );
        assert!(done.is_none());
        assert_eq!(deferred.pending_len(7), 1);
    }

    #[test]
    fn queue_is_bounded_drop_oldest() {
        let deferred = DeferredCaptures::new();
        assert!(deferred.enqueue(7, pending(LineHook::DataLeft), 2));
        assert!(deferred.enqueue(7, pending(LineHook::DataLeft), 2));
        assert!(!deferred.enqueue(7, pending(LineHook::DataLeft), 2));
        assert_eq!(deferred.pending_len(7), 2);
    }

    #[test]
    fn exception_completion_tags_error() {
        let deferred = DeferredCaptures::new();
        deferred.enqueue(7, pending(LineHook::DataLeft), 16);
        let frame = Frame::new("views.py", "handle", 11);
        let settings = EngineSettings::default();
        let done = deferred
            .try_complete(
                7,
                &ExecutionEvent::Exception {
                    message: SmolStr::new("boom"),
                },
                &frame,
                9,
                &ExprEvaluator,
                &settings,
            )
            .unwrap();
        assert_eq!(done.tags.error.as_deref(), Some("boom"));
        assert_eq!(done.end_ms, 9);
    }
}
