//! `linetap-engine` - dynamic conditional tracepoint engine.
//!
//! A host runtime embeds a [`Dispatcher`] and forwards every relevant
//! execution event to it through [`InterceptHook`]. The engine matches
//! line hits against a hot-swappable tracepoint set, applies
//! conditions, rate limits and fire budgets, captures bounded frame
//! snapshots, evaluates watch expressions and log templates, and emits
//! structured [`Event`]s to a pluggable [`EventSink`] — without ever
//! letting a bad definition panic or stall the observed program.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Bounded frame snapshots.
pub mod capture;
/// Engine clocks.
pub mod clock;
/// Deferred two-phase captures.
pub mod defer;
/// Interception dispatcher.
pub mod dispatch;
/// Engine errors.
pub mod error;
/// Condition, watch and log-template evaluation.
pub mod eval;
/// Emitted events and the sink boundary.
pub mod event;
/// Host-runtime frame representation.
pub mod frame;
/// Host-runtime interception boundary.
pub mod hook;
/// Engine metrics collection.
pub mod metrics;
/// Background sampling for PROFILE tracepoints.
pub mod profile;
/// Per-tracepoint rate limiting.
pub mod ratelimit;
/// Atomically swappable tracepoint registry.
pub mod registry;
/// Engine settings snapshot.
pub mod settings;
/// Tracepoint definitions and wire ingress.
pub mod tracepoint;
/// Captured variable values.
pub mod value;

pub use clock::{Clock, ManualClock, StdClock};
pub use dispatch::Dispatcher;
pub use error::EngineError;
pub use eval::{Evaluator, ExprEvaluator, WatchResult};
pub use event::{BufferSink, ChannelSink, Event, EventSink, SinkMessage, StackFrameSummary};
pub use frame::{Frame, FrameSignature};
pub use hook::{ExecutionEvent, InterceptHook, NoopHook};
pub use settings::EngineSettings;
pub use tracepoint::{LineHook, LogLevel, Tracepoint, TracepointDto, TracepointKind};
pub use value::Value;
