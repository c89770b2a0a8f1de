//! Tracepoint definitions and wire ingress.

#![allow(missing_docs)]

use indexmap::IndexMap;
use serde::Deserialize;
use smol_str::SmolStr;
use tracing::Level;

use crate::error::EngineError;
use crate::eval::LogTemplate;
use crate::settings::EngineSettings;

/// Capture behavior of a tracepoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracepointKind {
    /// Capture the current frame's variables.
    LineFrame,
    /// Fire without capturing variables.
    NoFrame,
    /// Emit a formatted log message alongside the capture.
    LogPoint,
    /// Capture the current frame plus its ancestor chain.
    Stack,
    /// Bare fire marker: no variables, no watches, no log.
    TraceOnly,
    /// Start a background sampling session on fire.
    Profile,
}

impl TracepointKind {
    fn parse(text: &str) -> Result<Self, EngineError> {
        match text {
            "LINE_FRAME" => Ok(Self::LineFrame),
            "NO_FRAME" => Ok(Self::NoFrame),
            "LOG_POINT" => Ok(Self::LogPoint),
            "STACK" => Ok(Self::Stack),
            "TRACE_ONLY" => Ok(Self::TraceOnly),
            "PROFILE" => Ok(Self::Profile),
            other => Err(EngineError::InvalidKind(SmolStr::new(other))),
        }
    }

    /// Whether this kind records frame variables at all.
    #[must_use]
    pub fn captures_variables(self) -> bool {
        matches!(self, Self::LineFrame | Self::LogPoint | Self::Stack | Self::Profile)
    }

    /// Whether this kind evaluates watches and log templates.
    #[must_use]
    pub fn evaluates_watches(self) -> bool {
        !matches!(self, Self::TraceOnly)
    }
}

/// Two-phase capture behavior around the instrumented line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineHook {
    /// Emit immediately after the capture.
    #[default]
    None,
    /// Capture before the line, emit once the line has executed.
    DataLeft,
    /// Capture before and after the line, merge, then emit.
    DataRight,
}

impl LineHook {
    fn parse(text: &str) -> Result<Self, EngineError> {
        match text {
            "none" => Ok(Self::None),
            "data_left" => Ok(Self::DataLeft),
            "data_right" => Ok(Self::DataRight),
            other => Err(EngineError::InvalidLineHook(SmolStr::new(other))),
        }
    }

    /// Whether emission is deferred past the instrumented line.
    #[must_use]
    pub fn is_deferred(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Severity for logpoint emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn parse(text: &str) -> Result<Self, EngineError> {
        match text.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(EngineError::InvalidLogLevel(SmolStr::new(other))),
        }
    }

    #[must_use]
    pub fn as_tracing(self) -> Level {
        match self {
            Self::Trace => Level::TRACE,
            Self::Debug => Level::DEBUG,
            Self::Info => Level::INFO,
            Self::Warn => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }
}

/// Immutable tracepoint definition, validated and normalized from its
/// wire form. Replaced wholesale on registry updates, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracepoint {
    pub id: SmolStr,
    /// Source file basename used as the lookup key.
    pub source_file: SmolStr,
    pub line: u32,
    pub kind: TracepointKind,
    /// Optional condition expression; evaluator-owned syntax.
    pub condition: Option<SmolStr>,
    /// `None` = unbounded.
    pub fire_count_limit: Option<u64>,
    pub rate_limit_ms: i64,
    pub log_msg: Option<LogTemplate>,
    pub logger_name: SmolStr,
    pub log_level: LogLevel,
    pub log_on_error: bool,
    pub log_frame_on_error: bool,
    pub line_hook: LineHook,
    /// Named watch expressions, in definition order.
    pub watches: IndexMap<SmolStr, SmolStr>,
}

impl Tracepoint {
    /// Validate and normalize a wire definition.
    pub fn from_dto(dto: TracepointDto, settings: &EngineSettings) -> Result<Self, EngineError> {
        let invalid = |reason: &str| EngineError::InvalidTracepoint {
            id: dto.id.clone(),
            reason: SmolStr::new(reason),
        };
        if dto.id.is_empty() {
            return Err(EngineError::InvalidTracepoint {
                id: SmolStr::new("?"),
                reason: SmolStr::new("empty id"),
            });
        }
        if dto.file.is_empty() {
            return Err(invalid("empty source file"));
        }
        let fire_count_limit = match dto.fire_count_limit {
            None | Some(-1) => None,
            Some(limit) if limit >= 0 => Some(limit as u64),
            Some(_) => return Err(invalid("fire count limit must be >= -1")),
        };
        let kind = TracepointKind::parse(&dto.kind)?;
        let line_hook = match dto.args.line_hook.as_deref() {
            Some(text) => LineHook::parse(text)?,
            None => LineHook::None,
        };
        let log_level = match dto.args.log_level.as_deref() {
            Some(text) => LogLevel::parse(text)?,
            None => LogLevel::default(),
        };
        let rate_limit_ms = dto.args.rate_limit.unwrap_or(settings.default_rate_limit_ms);
        if rate_limit_ms < 0 {
            return Err(invalid("rate limit must be >= 0"));
        }
        Ok(Self {
            id: dto.id,
            source_file: basename(&dto.file),
            line: dto.line,
            kind,
            condition: dto.condition.filter(|text| !text.trim().is_empty()),
            fire_count_limit,
            rate_limit_ms,
            log_msg: dto.args.log_msg.as_deref().map(LogTemplate::parse),
            logger_name: dto
                .args
                .logger_name
                .unwrap_or_else(|| SmolStr::new("linetap")),
            log_level,
            log_on_error: dto.args.log_on_error,
            log_frame_on_error: dto.args.log_frame_on_error,
            line_hook,
            watches: dto.args.watchers,
        })
    }
}

/// Wire form pushed by the tracepoint source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TracepointDto {
    pub id: SmolStr,
    pub file: SmolStr,
    pub line: u32,
    #[serde(rename = "type")]
    pub kind: SmolStr,
    pub condition: Option<SmolStr>,
    #[serde(rename = "fireCountLimit")]
    pub fire_count_limit: Option<i64>,
    pub args: TracepointArgs,
}

/// Optional configuration map on a tracepoint definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TracepointArgs {
    pub rate_limit: Option<i64>,
    pub log_msg: Option<String>,
    pub logger_name: Option<SmolStr>,
    pub log_level: Option<SmolStr>,
    pub log_on_error: bool,
    pub log_frame_on_error: bool,
    pub line_hook: Option<SmolStr>,
    pub watchers: IndexMap<SmolStr, SmolStr>,
}

fn basename(path: &str) -> SmolStr {
    let tail = path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path);
    SmolStr::new(tail)
}
