//! Field-tag derivation.
//!
//! Records produced by a fan-out carry the parameters that produced them as
//! extra fields, so downstream pivots can group by request. The key
//! transform is a protocol contract with the UI layer: parameter names are
//! tokenized on non-alphanumeric separators, title-cased, and prefixed.

use serde_json::{Map, Value};

/// Prefix for every derived tag key.
pub const REQUEST_FIELD_PREFIX: &str = "request";

/// Derive the tag key for a parameter name.
///
/// `"report_year"` becomes `"requestReportYear"`; a name with no
/// alphanumeric content yields `None`.
pub fn request_field_key(key: &str) -> Option<String> {
    let mut suffix = String::new();
    for token in key.trim().split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = token.chars();
        if let Some(first) = chars.next() {
            suffix.push(first.to_ascii_uppercase());
            suffix.push_str(chars.as_str());
        }
    }
    if suffix.is_empty() {
        return None;
    }
    Some(format!("{REQUEST_FIELD_PREFIX}{suffix}"))
}

/// Build the tag map for a dispatch unit's params source.
///
/// The source resolves to a parameter object when it is one directly, or a
/// one-element array wrapping one; anything else produces no tags.
pub(crate) fn request_fields_from_params(params: Option<&Value>) -> Map<String, Value> {
    let Some(object) = params.and_then(resolve_params_object) else {
        return Map::new();
    };
    let mut fields = Map::new();
    for (key, value) in object {
        if let Some(field_key) = request_field_key(key) {
            fields.insert(field_key, value.clone());
        }
    }
    fields
}

pub(crate) fn resolve_params_object(params: &Value) -> Option<&Map<String, Value>> {
    match params {
        Value::Object(map) => Some(map),
        Value::Array(items) if items.len() == 1 => items[0].as_object(),
        _ => None,
    }
}

/// Stamp tag fields onto every record, without overwriting real data.
///
/// A key already present on a record is left alone; non-object records pass
/// through unchanged.
pub fn apply_request_fields(records: Vec<Value>, fields: &Map<String, Value>) -> Vec<Value> {
    if fields.is_empty() {
        return records;
    }
    records
        .into_iter()
        .map(|record| match record {
            Value::Object(mut map) => {
                for (key, value) in fields {
                    if !map.contains_key(key) {
                        map.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(map)
            }
            other => other,
        })
        .collect()
}
