//! Engine errors.

#![allow(missing_docs)]

use smol_str::SmolStr;
use thiserror::Error;

/// Errors surfaced at the engine's control surfaces.
///
/// None of these ever cross into the observed program's control flow;
/// they are returned to the tracepoint source or logged internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Tracepoint definition rejected during registry replacement.
    #[error("invalid tracepoint '{id}': {reason}")]
    InvalidTracepoint { id: SmolStr, reason: SmolStr },

    /// Unknown tracepoint type string.
    #[error("invalid tracepoint type '{0}'")]
    InvalidKind(SmolStr),

    /// Unknown line hook string.
    #[error("invalid line hook '{0}'")]
    InvalidLineHook(SmolStr),

    /// Unknown log level string.
    #[error("invalid log level '{0}'")]
    InvalidLogLevel(SmolStr),

    /// Configuration error.
    #[error("invalid config '{0}'")]
    InvalidConfig(SmolStr),

    /// Thread spawn error.
    #[error("thread spawn error '{0}'")]
    ThreadSpawn(SmolStr),
}
