//! Host-runtime frame representation.

#![allow(missing_docs)]

use std::sync::Arc;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::value::Value;

/// One call-stack activation as reported by the host runtime.
///
/// The host builds a `Frame` for every execution event it forwards to
/// the hook; `caller` links form the ancestor chain for stack captures.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Source file basename.
    pub file: SmolStr,
    /// Function (or method) name.
    pub function: SmolStr,
    /// Current source line.
    pub line: u32,
    /// Local bindings visible at this point.
    pub locals: IndexMap<SmolStr, Value>,
    /// Calling frame, if any.
    pub caller: Option<Arc<Frame>>,
}

impl Frame {
    /// Create a frame with no locals and no caller.
    #[must_use]
    pub fn new(file: impl Into<SmolStr>, function: impl Into<SmolStr>, line: u32) -> Self {
        Self {
            file: file.into(),
            function: function.into(),
            line,
            locals: IndexMap::new(),
            caller: None,
        }
    }

    /// Add a local binding (builder style, used by hosts and tests).
    #[must_use]
    pub fn local(mut self, name: impl Into<SmolStr>, value: Value) -> Self {
        self.locals.insert(name.into(), value);
        self
    }

    /// Set the calling frame (builder style).
    #[must_use]
    pub fn called_from(mut self, caller: Arc<Frame>) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Identity used to correlate deferred captures.
    #[must_use]
    pub fn signature(&self) -> FrameSignature {
        FrameSignature {
            file: self.file.clone(),
            function: self.function.clone(),
        }
    }

    /// Number of frames in the chain, current frame included.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self.caller.as_deref();
        while let Some(frame) = current {
            depth += 1;
            current = frame.caller.as_deref();
        }
        depth
    }
}

/// Source file plus function name; the correlation key for two-phase
/// captures (spanning line numbers within the same activation).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameSignature {
    pub file: SmolStr,
    pub function: SmolStr,
}
