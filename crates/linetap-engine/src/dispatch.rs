//! Interception dispatcher: the hook the host runtime drives.
//!
//! Runs inline on whichever observed-program thread reaches an
//! instrumented line, possibly on many threads at once. Everything it
//! does is bounded by the line budget or self-truncates; no failure in
//! any sub-component may reach the host's control flow.

#![allow(missing_docs)]

use std::sync::Arc;

use rand::seq::SliceRandom;
use smol_str::SmolStr;
use tracing::Level;

use crate::capture::{capture, CaptureOptions, FrameSnapshot};
use crate::clock::{Clock, StdClock};
use crate::defer::{DeferredCaptures, PendingCapture};
use crate::error::EngineError;
use crate::eval::{
    evaluate_condition, evaluate_watch, format_log_message, Evaluator, ExprEvaluator,
};
use crate::event::{Event, EventSink};
use crate::frame::Frame;
use crate::hook::{ExecutionEvent, InterceptHook};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::profile::ProfilingCoordinator;
use crate::ratelimit::{FireDecision, RateLimiter, RateSnapshot};
use crate::registry::TracepointRegistry;
use crate::settings::EngineSettings;
use crate::tracepoint::{LogLevel, Tracepoint, TracepointDto, TracepointKind};

/// The tracepoint engine's root object.
///
/// Owns the registry, rate limiter, deferred-capture queues and
/// profiling coordinator; implements [`InterceptHook`] for the host.
pub struct Dispatcher {
    registry: TracepointRegistry,
    limiter: RateLimiter,
    deferred: DeferredCaptures,
    profiler: ProfilingCoordinator,
    evaluator: Arc<dyn Evaluator>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    metrics: EngineMetrics,
}

impl Dispatcher {
    /// Engine with the built-in evaluator, a standard clock and default
    /// settings.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self::with_parts(
            Arc::new(ExprEvaluator),
            sink,
            Arc::new(StdClock::new()),
            EngineSettings::default(),
        )
    }

    /// Engine with explicit collaborators (embedding runtimes supply
    /// their own evaluator; tests supply a manual clock).
    #[must_use]
    pub fn with_parts(
        evaluator: Arc<dyn Evaluator>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry: TracepointRegistry::new(),
            limiter: RateLimiter::new(),
            deferred: DeferredCaptures::new(),
            profiler: ProfilingCoordinator::new(),
            evaluator,
            sink,
            clock,
            settings,
            metrics: EngineMetrics::new(),
        }
    }

    /// Install a new tracepoint set pushed by the tracepoint source.
    /// Clears all rate-limit history on success; a validation error
    /// leaves the old set and its history active.
    pub fn replace_tracepoints(
        &self,
        dtos: Vec<TracepointDto>,
    ) -> Result<usize, EngineError> {
        let installed = self.registry.replace(dtos, &self.settings)?;
        self.limiter.reset();
        Ok(installed)
    }

    /// Point-in-time engine counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Engine settings in effect.
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Stop background profiling sessions; called on embedder shutdown.
    pub fn shutdown(&self) {
        self.profiler.stop_all();
    }

    fn handle_line(&self, frame: &Arc<Frame>, thread_id: u64, started_at_ms: i64) {
        let index = self.registry.load();
        let candidates: Vec<Arc<Tracepoint>> = index
            .for_line(&frame.file, frame.line)
            .map(Arc::clone)
            .collect();
        if candidates.is_empty() {
            return;
        }

        // Copy of the shared counters for this line hit; committed back
        // once the whole batch is done.
        let mut rates = self.limiter.snapshot();
        let mut batch = self.collect_batch(candidates, frame, started_at_ms, &mut rates);
        if batch.is_empty() {
            self.limiter.commit(rates);
            return;
        }

        if batch.len() > self.settings.max_tracepoints_per_line {
            let mut rng = rand::rng();
            batch.shuffle(&mut rng);
            let skipped: Vec<SmolStr> = batch
                .split_off(self.settings.max_tracepoints_per_line)
                .into_iter()
                .map(|(tracepoint, _)| tracepoint.id.clone())
                .collect();
            self.metrics.record_skipped(skipped.len() as u64);
            self.sink.send_skipped(skipped);
        }

        let include_ancestors = batch
            .iter()
            .any(|(tracepoint, _)| tracepoint.kind == TracepointKind::Stack);
        // `log_frame_on_error` needs bindings in the snapshot even for
        // kinds that do not normally record variables.
        let needs_variables = batch.iter().any(|(tracepoint, _)| {
            tracepoint.kind.captures_variables()
                || (tracepoint.log_frame_on_error && tracepoint.log_msg.is_some())
        });
        let mut opts = CaptureOptions::from_settings(&self.settings, include_ancestors, started_at_ms);
        if !needs_variables {
            opts = opts.without_variables();
        }
        // One capture shared by every tracepoint matching this line.
        let snapshot = capture(frame, self.clock.now_ms(), &opts);

        let mut profile_ids = Vec::new();
        for (tracepoint, suppressed) in batch {
            let event = self.build_event(&tracepoint, suppressed, frame, &snapshot, started_at_ms);
            if tracepoint.kind == TracepointKind::Profile {
                profile_ids.push(tracepoint.id.clone());
            }
            if tracepoint.line_hook.is_deferred() && !event.tags.line_time_exceeded {
                let kept = self.deferred.enqueue(
                    thread_id,
                    PendingCapture {
                        tracepoint: Arc::clone(&tracepoint),
                        left: event,
                        signature: frame.signature(),
                    },
                    self.settings.max_pending_per_thread,
                );
                if !kept {
                    self.metrics.record_deferred_dropped();
                }
            } else {
                self.metrics.record_event();
                self.sink.send(event);
            }
        }

        if !profile_ids.is_empty() {
            self.profiler.start(
                Arc::clone(frame),
                thread_id,
                profile_ids,
                Arc::clone(&self.sink),
                Arc::clone(&self.clock),
                &self.settings,
            );
        }

        self.limiter.commit(rates);
    }

    /// Evaluate conditions and the rate limiter for every candidate on
    /// this line, collecting the ones that fire.
    fn collect_batch(
        &self,
        candidates: Vec<Arc<Tracepoint>>,
        frame: &Frame,
        now_ms: i64,
        rates: &mut RateSnapshot,
    ) -> Vec<(Arc<Tracepoint>, u64)> {
        let mut batch = Vec::new();
        for tracepoint in candidates {
            if let Some(condition) = &tracepoint.condition {
                if !evaluate_condition(&*self.evaluator, condition, &frame.locals) {
                    continue;
                }
            }
            match rates.can_fire(
                &tracepoint.id,
                now_ms,
                tracepoint.rate_limit_ms,
                tracepoint.fire_count_limit,
            ) {
                FireDecision::Fire { suppressed } => batch.push((tracepoint, suppressed)),
                FireDecision::RateLimited => self.metrics.record_suppressed(),
                FireDecision::LimitReached => {}
            }
        }
        batch
    }

    fn build_event(
        &self,
        tracepoint: &Tracepoint,
        suppressed: u64,
        frame: &Frame,
        snapshot: &FrameSnapshot,
        started_at_ms: i64,
    ) -> Event {
        let mut event = Event::new(tracepoint.id.clone(), started_at_ms);
        event.tags.suppressed = suppressed;

        // Over budget: emit the minimal flagged form and skip all
        // remaining per-tracepoint work.
        let elapsed = self.clock.now_ms().saturating_sub(started_at_ms);
        if snapshot.line_time_exceeded || elapsed > self.settings.line_budget_ms {
            event.tags.line_time_exceeded = true;
            event.stack = snapshot.stack.clone();
            event.end_ms = self.clock.now_ms();
            self.metrics.record_truncated();
            return event;
        }

        match tracepoint.kind {
            TracepointKind::Stack => {
                event.stack = snapshot.stack.clone();
                event.variables = snapshot.variables.clone();
            }
            TracepointKind::NoFrame | TracepointKind::TraceOnly => {
                event.stack = snapshot.stack.first().cloned().into_iter().collect();
            }
            _ => {
                event.stack = snapshot.stack.first().cloned().into_iter().collect();
                event.variables = snapshot.variables.clone();
            }
        }

        if tracepoint.kind.evaluates_watches() {
            for (name, expression) in &tracepoint.watches {
                let result = evaluate_watch(&*self.evaluator, expression, &frame.locals);
                if result.is_error() {
                    self.metrics.record_eval_error();
                }
                event.watch_results.insert(name.clone(), result);
            }
            if let Some(template) = &tracepoint.log_msg {
                let formatted =
                    format_log_message(&*self.evaluator, template, &frame.locals);
                for (name, result) in formatted.fields {
                    if result.is_error() {
                        self.metrics.record_eval_error();
                    }
                    event.watch_results.entry(name).or_insert(result);
                }
                let message = if formatted.had_error && tracepoint.log_on_error {
                    // Formatting failed: fall back to the raw template at
                    // error severity so the operator sees what was asked.
                    emit_log(LogLevel::Error, &tracepoint.logger_name, &template.raw);
                    if tracepoint.log_frame_on_error {
                        event.variables = snapshot.variables.clone();
                    }
                    template.raw.to_string()
                } else {
                    emit_log(tracepoint.log_level, &tracepoint.logger_name, &formatted.message);
                    formatted.message
                };
                event.log_message = Some(message);
            }
        }

        event.end_ms = self.clock.now_ms();
        event
    }
}

impl InterceptHook for Dispatcher {
    fn on_event(&self, event: &ExecutionEvent, frame: &Arc<Frame>, thread_id: u64) {
        // No-op fast path: this hook runs on every executed line of the
        // observed program.
        if self.registry.is_empty() {
            return;
        }
        let started_at_ms = self.clock.now_ms();

        if event.completes_deferred() {
            if let Some(finished) = self.deferred.try_complete(
                thread_id,
                event,
                frame,
                started_at_ms,
                &*self.evaluator,
                &self.settings,
            ) {
                self.metrics.record_event();
                self.sink.send(finished);
            }
        }

        if matches!(event, ExecutionEvent::Line) {
            self.handle_line(frame, thread_id, started_at_ms);
        }
    }
}

fn emit_log(level: LogLevel, logger: &str, message: &str) {
    match level.as_tracing() {
        Level::TRACE => tracing::trace!(logger, "{message}"),
        Level::DEBUG => tracing::debug!(logger, "{message}"),
        Level::INFO => tracing::info!(logger, "{message}"),
        Level::WARN => tracing::warn!(logger, "{message}"),
        Level::ERROR => tracing::error!(logger, "{message}"),
    }
}
