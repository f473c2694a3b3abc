//! Helpers over the JSON values that flow between nodes.

pub use serde_json::Value;

/// Mapping produced by a node; every successful run carries an `"output"` key.
pub type OutputMap = serde_json::Map<String, Value>;

/// Key every node uses for its primary textual result.
pub const OUTPUT_KEY: &str = "output";

/// Render a value as text the way prompt substitution expects: strings
/// verbatim, `null` as empty, everything else as compact JSON.
pub fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
