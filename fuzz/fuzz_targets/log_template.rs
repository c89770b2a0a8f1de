#![no_main]

use indexmap::IndexMap;
use libfuzzer_sys::fuzz_target;
use linetap_engine::eval::{format_log_message, LogTemplate};
use linetap_engine::{ExprEvaluator, Value};
use smol_str::SmolStr;

const MAX_TEMPLATE_BYTES: usize = 4096;

fuzz_target!(|data: &[u8]| {
    let capped = &data[..data.len().min(MAX_TEMPLATE_BYTES)];
    let text = String::from_utf8_lossy(capped);

    let template = LogTemplate::parse(&text);

    let mut locals = IndexMap::new();
    locals.insert(SmolStr::new("x"), Value::Int(5));
    locals.insert(SmolStr::new("name"), Value::Str("fuzz".to_string()));

    // Rendering is total: failed placeholders come back in literal form.
    let formatted = format_log_message(&ExprEvaluator, &template, &locals);
    let _ = formatted.message.len();

    let empty = IndexMap::new();
    let _ = format_log_message(&ExprEvaluator, &template, &empty);
});
