//! Condition, watch and log-template evaluation.
//!
//! Every entry point here has the same failure contract: errors are
//! converted into values the operator can see (a false condition, an
//! error-text watch result, a literal placeholder in a log message) and
//! never propagate into the observed program.

#![allow(missing_docs)]

pub mod expr;

use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;
use thiserror::Error;
use tracing::debug;

use crate::value::Value;

/// Evaluation errors for the built-in expression engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Expression text could not be parsed.
    #[error("parse error: {0}")]
    Parse(SmolStr),

    /// Name not present in the captured bindings.
    #[error("undefined variable '{0}'")]
    UndefinedVariable(SmolStr),

    /// Field not present on a map value.
    #[error("undefined field '{0}'")]
    UndefinedField(SmolStr),

    /// Operand type not valid for the operation.
    #[error("type mismatch (expected {expected}, got {got})")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },

    /// Sequence index outside the captured bounds.
    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: i64, len: usize },
}

/// Pluggable expression evaluator.
///
/// The embedding runtime supplies this when it can evaluate richer
/// expressions against its own state; [`ExprEvaluator`] is the built-in
/// implementation over captured bindings. Implementations must return
/// `Err` rather than panic for any malformed input.
pub trait Evaluator: Send + Sync + 'static {
    /// Evaluate an expression against a snapshot of local bindings.
    fn evaluate(
        &self,
        expression: &str,
        bindings: &IndexMap<SmolStr, Value>,
    ) -> Result<Value, EvalError>;
}

/// Built-in evaluator backed by the `expr` parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExprEvaluator;

impl Evaluator for ExprEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        bindings: &IndexMap<SmolStr, Value>,
    ) -> Result<Value, EvalError> {
        let parsed = expr::parse(expression)?;
        expr::eval(&parsed, bindings)
    }
}

/// Outcome of a watch evaluation; failures become visible values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WatchResult {
    Value(Value),
    Error(String),
}

impl WatchResult {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, WatchResult::Error(_))
    }
}

/// Evaluate a tracepoint condition. Failures log and report false, so a
/// broken condition can never fire its tracepoint.
pub fn evaluate_condition(
    evaluator: &dyn Evaluator,
    expression: &str,
    bindings: &IndexMap<SmolStr, Value>,
) -> bool {
    match evaluator.evaluate(expression, bindings) {
        Ok(Value::Bool(value)) => value,
        Ok(other) => {
            debug!(expression, got = other.type_name(), "condition was not a bool");
            false
        }
        Err(err) => {
            debug!(expression, error = %err, "condition evaluation failed");
            false
        }
    }
}

/// Evaluate a watch expression; the error text itself is the recorded
/// value on failure.
pub fn evaluate_watch(
    evaluator: &dyn Evaluator,
    expression: &str,
    bindings: &IndexMap<SmolStr, Value>,
) -> WatchResult {
    match evaluator.evaluate(expression, bindings) {
        Ok(value) => WatchResult::Value(value),
        Err(err) => WatchResult::Error(err.to_string()),
    }
}

/// One piece of a parsed log template.
#[derive(Debug, Clone, PartialEq)]
pub enum LogFragment {
    /// Literal text.
    Text(String),
    /// Expression placeholder to evaluate at fire time.
    Expr(SmolStr),
}

/// Log message template, parsed once at registry-replace time.
#[derive(Debug, Clone, PartialEq)]
pub struct LogTemplate {
    /// Raw template text, kept for `log_on_error` fallback.
    pub raw: SmolStr,
    /// Parsed fragments.
    pub fragments: Vec<LogFragment>,
}

impl LogTemplate {
    /// Parse `{expr}` placeholders; `{{` and `}}` escape literal braces.
    /// An unterminated placeholder is kept as literal text rather than
    /// rejecting the whole template.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut fragments = Vec::new();
        let mut text = String::new();
        let mut chars = raw.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let mut placeholder = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        placeholder.push(inner);
                    }
                    if closed {
                        if !text.is_empty() {
                            fragments.push(LogFragment::Text(std::mem::take(&mut text)));
                        }
                        fragments.push(LogFragment::Expr(SmolStr::new(placeholder.trim())));
                    } else {
                        text.push('{');
                        text.push_str(&placeholder);
                    }
                }
                other => text.push(other),
            }
        }
        if !text.is_empty() {
            fragments.push(LogFragment::Text(text));
        }
        Self {
            raw: SmolStr::new(raw),
            fragments,
        }
    }
}

/// A formatted log message plus the per-placeholder results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormattedLog {
    /// Rendered message; failed placeholders appear in literal form.
    pub message: String,
    /// Result for every placeholder, in template order.
    pub fields: Vec<(SmolStr, WatchResult)>,
    /// Whether any placeholder failed to evaluate.
    pub had_error: bool,
}

/// Render a log template against captured bindings. A placeholder that
/// fails to evaluate renders as its literal `{expr}` form and is also
/// recorded as an error field, so the operator sees exactly what broke.
pub fn format_log_message(
    evaluator: &dyn Evaluator,
    template: &LogTemplate,
    bindings: &IndexMap<SmolStr, Value>,
) -> FormattedLog {
    let mut formatted = FormattedLog::default();
    for fragment in &template.fragments {
        match fragment {
            LogFragment::Text(text) => formatted.message.push_str(text),
            LogFragment::Expr(expression) => {
                let result = evaluate_watch(evaluator, expression, bindings);
                match &result {
                    WatchResult::Value(value) => {
                        formatted.message.push_str(&value.to_string());
                    }
                    WatchResult::Error(_) => {
                        formatted.had_error = true;
                        formatted.message.push('{');
                        formatted.message.push_str(expression);
                        formatted.message.push('}');
                    }
                }
                formatted.fields.push((expression.clone(), result));
            }
        }
    }
    formatted
}
