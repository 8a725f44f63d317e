//! Task-scoped SSE streaming: live fan-out plus durable replay for clients
//! that connect late or reconnect (spec §4.2, §4.3).

pub mod manager;
pub mod persistent_buffer;

pub use manager::SseManager;
pub use persistent_buffer::PersistentEventBuffer;

/// Recursively replaces non-finite floats with `null` so a payload that
/// started life as a Python `float('nan')`/`float('inf')` still serializes
/// to valid JSON on the wire (spec §4.2).
pub fn sanitize_json(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Value::Null,
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_json).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_json(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod sanitize_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nan_and_infinity_become_null() {
        let raw = json!({"a": f64::NAN, "b": [f64::INFINITY, 1.0]});
        let clean = sanitize_json(raw);
        assert_eq!(clean["a"], serde_json::Value::Null);
        assert_eq!(clean["b"][0], serde_json::Value::Null);
        assert_eq!(clean["b"][1], 1.0);
    }
}
