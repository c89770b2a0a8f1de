//! Bounded frame snapshots.

#![allow(missing_docs)]

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::event::StackFrameSummary;
use crate::frame::Frame;
use crate::settings::EngineSettings;
use crate::value::Value;

/// Limits applied to one snapshot.
#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    /// Record the caller chain, not just the current frame.
    pub include_ancestors: bool,
    /// Total variable entries (names, elements, fields) to copy;
    /// zero disables variable capture entirely.
    pub max_vars: usize,
    /// Container nesting levels to descend into.
    pub max_depth: usize,
    /// Ancestor frames recorded at most.
    pub max_stack_frames: usize,
    /// When the surrounding line hit started.
    pub started_at_ms: i64,
    /// Line budget; capture degrades to a stub once it has elapsed.
    pub budget_ms: i64,
}

impl CaptureOptions {
    /// Options for a line hit starting at `started_at_ms`.
    #[must_use]
    pub fn from_settings(
        settings: &EngineSettings,
        include_ancestors: bool,
        started_at_ms: i64,
    ) -> Self {
        Self {
            include_ancestors,
            max_vars: settings.max_capture_vars,
            max_depth: settings.max_capture_depth,
            max_stack_frames: settings.max_stack_frames,
            started_at_ms,
            budget_ms: settings.line_budget_ms,
        }
    }

    /// Variant with variable capture disabled (NO_FRAME / TRACE_ONLY).
    #[must_use]
    pub fn without_variables(mut self) -> Self {
        self.max_vars = 0;
        self
    }
}

/// Bounded snapshot of one frame (and optionally its ancestors).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSnapshot {
    pub stack: Vec<StackFrameSummary>,
    pub variables: IndexMap<SmolStr, Value>,
    /// Set when the variable walk hit `max_vars` or `max_depth`.
    pub truncated: bool,
    /// Set when the line budget had already elapsed at capture time.
    pub line_time_exceeded: bool,
}

/// Take a snapshot of `frame` within the given bounds. If the line
/// budget has already elapsed, variable capture is skipped and the stub
/// is flagged so the flag can propagate to the event.
#[must_use]
pub fn capture(frame: &Frame, now_ms: i64, opts: &CaptureOptions) -> FrameSnapshot {
    let mut snapshot = FrameSnapshot {
        stack: capture_stack(frame, opts),
        ..FrameSnapshot::default()
    };
    if now_ms.saturating_sub(opts.started_at_ms) > opts.budget_ms {
        snapshot.line_time_exceeded = true;
        return snapshot;
    }
    if opts.max_vars == 0 {
        return snapshot;
    }
    let mut remaining = opts.max_vars;
    for (name, value) in &frame.locals {
        if remaining == 0 {
            snapshot.truncated = true;
            break;
        }
        remaining -= 1;
        let (bounded, truncated) = bound_value(value, opts.max_depth, &mut remaining);
        snapshot.truncated |= truncated;
        snapshot.variables.insert(name.clone(), bounded);
    }
    snapshot
}

fn capture_stack(frame: &Frame, opts: &CaptureOptions) -> Vec<StackFrameSummary> {
    let mut stack = vec![summary(frame)];
    if opts.include_ancestors {
        let mut current = frame.caller.as_deref();
        while let Some(ancestor) = current {
            if stack.len() >= opts.max_stack_frames {
                break;
            }
            stack.push(summary(ancestor));
            current = ancestor.caller.as_deref();
        }
    }
    stack
}

fn summary(frame: &Frame) -> StackFrameSummary {
    StackFrameSummary {
        file: frame.file.clone(),
        function: frame.function.clone(),
        line: frame.line,
    }
}

// Level-limited copy sharing one entry budget across the whole
// snapshot. Depth is bounded by `max_capture_depth`, so recursion here
// cannot descend unboundedly into nested structures.
fn bound_value(value: &Value, depth_left: usize, remaining: &mut usize) -> (Value, bool) {
    match value {
        Value::Seq(items) => {
            if depth_left == 0 {
                return (Value::Str(format!("[{}]", items.len())), true);
            }
            let mut bounded = Vec::new();
            let mut truncated = false;
            for item in items {
                if *remaining == 0 {
                    truncated = true;
                    break;
                }
                *remaining -= 1;
                let (item, item_truncated) = bound_value(item, depth_left - 1, remaining);
                truncated |= item_truncated;
                bounded.push(item);
            }
            (Value::Seq(bounded), truncated)
        }
        Value::Map(fields) => {
            if depth_left == 0 {
                return (Value::Str(format!("{{{}}}", fields.len())), true);
            }
            let mut bounded = IndexMap::new();
            let mut truncated = false;
            for (name, field) in fields {
                if *remaining == 0 {
                    truncated = true;
                    break;
                }
                *remaining -= 1;
                let (field, field_truncated) = bound_value(field, depth_left - 1, remaining);
                truncated |= field_truncated;
                bounded.insert(name.clone(), field);
            }
            (Value::Map(bounded), truncated)
        }
        scalar => (scalar.clone(), false),
    }
}
