//! Host-runtime interception boundary.

#![allow(missing_docs)]

use std::sync::Arc;

use smol_str::SmolStr;

use crate::frame::Frame;

/// Execution event reported by the host runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// A frame was entered.
    Call,
    /// A source line is about to execute.
    Line,
    /// The current frame is returning.
    Return,
    /// An exception is propagating through the current frame.
    Exception {
        /// Host-provided description of the exception.
        message: SmolStr,
    },
}

impl ExecutionEvent {
    /// Events that may complete a pending two-phase capture.
    #[must_use]
    pub fn completes_deferred(&self) -> bool {
        !matches!(self, ExecutionEvent::Call)
    }
}

/// Hook invoked by the host runtime on every relevant execution event.
///
/// Runs inline on the observed program's threads; implementations must
/// be cheap when nothing is installed and must never panic outward.
pub trait InterceptHook: Send + Sync {
    /// Handle one execution event for a frame on a thread.
    fn on_event(&self, event: &ExecutionEvent, frame: &Arc<Frame>, thread_id: u64);
}

/// Hook that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl InterceptHook for NoopHook {
    fn on_event(&self, _event: &ExecutionEvent, _frame: &Arc<Frame>, _thread_id: u64) {}
}
