#![no_main]

use indexmap::IndexMap;
use libfuzzer_sys::fuzz_target;
use linetap_engine::eval::expr;
use linetap_engine::Value;
use smol_str::SmolStr;

const MAX_EXPR_BYTES: usize = 4096;

fn bindings(seed: u8) -> IndexMap<SmolStr, Value> {
    let mut locals = IndexMap::new();
    locals.insert(SmolStr::new("x"), Value::Int(i64::from(seed)));
    locals.insert(SmolStr::new("ratio"), Value::Float(f64::from(seed) / 7.0));
    locals.insert(SmolStr::new("name"), Value::Str("fuzz".to_string()));
    locals.insert(SmolStr::new("flag"), Value::Bool(seed % 2 == 0));
    locals.insert(
        SmolStr::new("items"),
        Value::Seq(vec![Value::Int(1), Value::Null, Value::Str(String::new())]),
    );
    let mut nested = IndexMap::new();
    nested.insert(SmolStr::new("total"), Value::Int(42));
    locals.insert(SmolStr::new("order"), Value::Map(nested));
    locals
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let seed = data[0];
    let capped = &data[1..data.len().min(MAX_EXPR_BYTES)];
    let text = String::from_utf8_lossy(capped);

    // Parse and evaluation must return Err on bad input, never panic.
    if let Ok(parsed) = expr::parse(&text) {
        let _ = expr::eval(&parsed, &bindings(seed));
        let _ = expr::eval(&parsed, &IndexMap::new());
    }
});
