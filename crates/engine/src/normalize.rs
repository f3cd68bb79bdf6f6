//! Response-envelope normalization.
//!
//! The backend's RPC envelope shape varies by endpoint family, so record
//! extraction probes a fixed priority list of wrappers and takes the first
//! array it finds.

use serde_json::Value;

/// Extract the record array from a response body.
///
/// Tried in order: the body itself, `records`, `data`, `result` (when it is
/// an array), `result.records`. First match wins; no match yields an empty
/// vec.
pub fn extract_records(payload: &Value) -> Vec<Value> {
    if let Value::Array(items) = payload {
        return items.clone();
    }
    let Value::Object(envelope) = payload else {
        return Vec::new();
    };

    for key in ["records", "data"] {
        if let Some(Value::Array(items)) = envelope.get(key) {
            return items.clone();
        }
    }
    match envelope.get("result") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(result)) => match result.get("records") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
