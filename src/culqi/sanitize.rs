use serde_json::Value;

/// Keys whose values never reach the logs
const SENSITIVE_KEYS: &[&str] = &["card_number", "cvv", "token", "source_id"];

const REDACTED: &str = "[REDACTED]";

/// Copy of `payload` with card data and tokens replaced, for logging
pub fn redact(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = if SENSITIVE_KEYS.contains(&key.as_str()) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact(value)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
