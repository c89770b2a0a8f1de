//! Emitted events and the sink boundary.

#![allow(missing_docs)]

use std::sync::mpsc::Sender;
use std::sync::Mutex;

use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;

use crate::eval::WatchResult;
use crate::value::Value;

/// One call-frame entry of an event's stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrameSummary {
    pub file: SmolStr,
    pub function: SmolStr,
    pub line: u32,
}

/// Flags and counters attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventTags {
    /// Hits rejected by the rate limiter since the previous fire.
    pub suppressed: u64,
    /// Set when processing was cut short by the line budget.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub line_time_exceeded: bool,
    /// Error description, e.g. an exception observed during a deferred
    /// capture or a degraded-capability report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Record emitted once per firing tracepoint; immutable after it is
/// handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub tracepoint_id: SmolStr,
    pub start_ms: i64,
    pub end_ms: i64,
    pub stack: Vec<StackFrameSummary>,
    pub variables: IndexMap<SmolStr, Value>,
    pub watch_results: IndexMap<SmolStr, WatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
    pub tags: EventTags,
}

impl Event {
    /// Start a bare event for a tracepoint at a given time.
    #[must_use]
    pub fn new(tracepoint_id: SmolStr, start_ms: i64) -> Self {
        Self {
            tracepoint_id,
            start_ms,
            end_ms: start_ms,
            stack: Vec::new(),
            variables: IndexMap::new(),
            watch_results: IndexMap::new(),
            log_message: None,
            tags: EventTags::default(),
        }
    }
}

/// Destination for finished events.
pub trait EventSink: Send + Sync + 'static {
    /// Deliver a finished event.
    fn send(&self, event: Event);

    /// Report tracepoints dropped from an over-budget line batch.
    fn send_skipped(&self, skipped: Vec<SmolStr>);
}

#[derive(Debug, Default)]
struct BufferState {
    events: Vec<Event>,
    skipped: Vec<Vec<SmolStr>>,
}

/// In-memory sink used by embedders that poll and by tests.
#[derive(Debug, Default)]
pub struct BufferSink {
    state: Mutex<BufferState>,
}

impl BufferSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain buffered events.
    #[must_use]
    pub fn drain_events(&self) -> Vec<Event> {
        let mut state = self.state.lock().expect("buffer sink lock poisoned");
        std::mem::take(&mut state.events)
    }

    /// Drain buffered skipped-batch markers.
    #[must_use]
    pub fn drain_skipped(&self) -> Vec<Vec<SmolStr>> {
        let mut state = self.state.lock().expect("buffer sink lock poisoned");
        std::mem::take(&mut state.skipped)
    }

    /// Number of buffered events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        let state = self.state.lock().expect("buffer sink lock poisoned");
        state.events.len()
    }
}

impl EventSink for BufferSink {
    fn send(&self, event: Event) {
        let mut state = self.state.lock().expect("buffer sink lock poisoned");
        state.events.push(event);
    }

    fn send_skipped(&self, skipped: Vec<SmolStr>) {
        let mut state = self.state.lock().expect("buffer sink lock poisoned");
        state.skipped.push(skipped);
    }
}

/// Message carried by a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkMessage {
    Event(Event),
    Skipped(Vec<SmolStr>),
}

/// Sink forwarding over an mpsc channel to a collector thread.
///
/// Sends are best-effort: a disconnected receiver drops the message
/// rather than surfacing an error into the observed program.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<SinkMessage>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: Sender<SinkMessage>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: Event) {
        let _ = self.tx.send(SinkMessage::Event(event));
    }

    fn send_skipped(&self, skipped: Vec<SmolStr>) {
        let _ = self.tx.send(SinkMessage::Skipped(skipped));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_without_empty_optionals() {
        let event = Event::new(SmolStr::new("tp1"), 12);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"tracepoint_id\":\"tp1\""));
        assert!(!json.contains("log_message"));
        assert!(!json.contains("line_time_exceeded"));
        assert!(!json.contains("\"error\""));
    }
}
