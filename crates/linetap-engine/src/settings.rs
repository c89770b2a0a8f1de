//! Engine settings snapshot.

#![allow(missing_docs)]

use serde::Deserialize;
use smol_str::SmolStr;

use crate::error::EngineError;

/// Tunable limits for the interception hot path.
///
/// Every bound exists to keep per-line overhead predictable; none of
/// them affects which tracepoints match, only how much work a match is
/// allowed to do.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Rate limit applied when a tracepoint does not set its own.
    pub default_rate_limit_ms: i64,
    /// Maximum tracepoints processed for a single line hit.
    pub max_tracepoints_per_line: usize,
    /// Processing budget for one line hit, in milliseconds.
    pub line_budget_ms: i64,
    /// Maximum captured variable entries per snapshot.
    pub max_capture_vars: usize,
    /// Maximum nesting depth captured inside container values.
    pub max_capture_depth: usize,
    /// Maximum ancestor frames recorded for stack captures.
    pub max_stack_frames: usize,
    /// Maximum queued two-phase captures per thread.
    pub max_pending_per_thread: usize,
    /// Sampling interval for profiling sessions.
    pub profile_sample_interval_ms: u64,
    /// Samples taken before a profiling session stops on its own.
    pub profile_max_samples: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_rate_limit_ms: 500,
            max_tracepoints_per_line: 8,
            line_budget_ms: 100,
            max_capture_vars: 128,
            max_capture_depth: 4,
            max_stack_frames: 64,
            max_pending_per_thread: 16,
            profile_sample_interval_ms: 10,
            profile_max_samples: 1000,
        }
    }
}

impl EngineSettings {
    /// Parse settings from a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, EngineError> {
        toml::from_str(text)
            .map_err(|err| EngineError::InvalidConfig(SmolStr::new(err.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_defaults() {
        let settings = EngineSettings::from_toml(
            "default_rate_limit_ms = 250\nmax_tracepoints_per_line = 2\n",
        )
        .unwrap();
        assert_eq!(settings.default_rate_limit_ms, 250);
        assert_eq!(settings.max_tracepoints_per_line, 2);
        assert_eq!(settings.line_budget_ms, EngineSettings::default().line_budget_ms);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            EngineSettings::from_toml("no_such_key = 1\n"),
            Err(EngineError::InvalidConfig(_))
        ));
    }
}
