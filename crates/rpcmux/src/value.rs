//! Dynamic argument and result values.
//!
//! Every codec decodes into and encodes from [`serde_json::Value`], built
//! with the `preserve_order` feature so struct members keep their wire order
//! across the XML codecs.

pub use serde_json::{Map, Value};

/// Renders an argument list for diagnostics, e.g. `"World", 5`.
#[must_use]
pub fn render_args(args: &[Value]) -> String {
    args.iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Short type label of a value, used when logging unmatched calls.
#[must_use]
pub fn type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
