//! Request-body analysis.
//!
//! A stored body template is either a plain payload (one request) or a
//! fan-out description: an object carrying a `requests` list, or a `params`
//! array whose elements each stand for one sub-request. This module
//! classifies the template and derives the ordered list of concrete
//! dispatch units, each pairing an effective request with the field tags to
//! stamp onto its records.

use pivotfeed_types::RequestDescriptor;
use serde_json::{Map, Value};

use crate::fields::request_fields_from_params;

/// One concrete request derived from a body template.
///
/// Ephemeral: lives only for the duration of a single dispatch.
#[derive(Debug, Clone)]
pub struct DispatchUnit {
    /// The request to send.
    pub request: RequestDescriptor,
    /// Tag keys/values applied as defaults to every record of the response.
    pub field_tags: Map<String, Value>,
}

/// Derive the ordered dispatch units for a base request.
///
/// Non-splittable bodies (absent, opaque strings, non-object payloads,
/// `params` arrays shorter than two or of mixed types) yield exactly one
/// unit carrying the base request untouched. A `requests` list whose
/// entries are all unusable yields an empty vec; the dispatcher falls back
/// to the original request in that case.
pub fn build_dispatch_units(base: &RequestDescriptor) -> Vec<DispatchUnit> {
    let Some(body) = normalize_raw_body(base.body.as_ref()) else {
        return vec![single_unit(base, None)];
    };
    let Value::Object(template) = body else {
        // Opaque payloads are never split.
        return vec![single_unit(base, None)];
    };

    if let Some(Value::Array(entries)) = template.get("requests")
        && !entries.is_empty()
    {
        return units_from_requests(base, &template, entries);
    }

    if let Some(Value::Array(param_sets)) = template.get("params")
        && is_splittable_param_set(param_sets)
    {
        return units_from_params(base, &template, param_sets);
    }

    single_request(base, &template)
}

/// Normalize a raw body into a structured value, if it has one.
///
/// Strings are parsed as JSON; an unparsable string is treated as opaque
/// and reported as `None`, which forces the single-request path with the
/// original body intact.
fn normalize_raw_body(body: Option<&Value>) -> Option<Value> {
    match body {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => {
            if raw.trim().is_empty() {
                return None;
            }
            serde_json::from_str(raw).ok()
        }
        Some(other) => Some(other.clone()),
    }
}

/// A `params` array splits into one request per element only when it has at
/// least two elements and every element is a plain keyed object.
fn is_splittable_param_set(param_sets: &[Value]) -> bool {
    param_sets.len() >= 2 && param_sets.iter().all(Value::is_object)
}

fn single_request(base: &RequestDescriptor, template: &Map<String, Value>) -> Vec<DispatchUnit> {
    vec![single_unit(base, template.get("params"))]
}

fn single_unit(base: &RequestDescriptor, params_source: Option<&Value>) -> DispatchUnit {
    DispatchUnit {
        request: base.clone(),
        field_tags: request_fields_from_params(params_source),
    }
}

/// Effective body and tagging source derived from one `requests[]` entry.
struct DerivedBody {
    body: Map<String, Value>,
    params_source: Option<Value>,
}

fn units_from_requests(base: &RequestDescriptor, template: &Map<String, Value>, entries: &[Value]) -> Vec<DispatchUnit> {
    let mut base_body = template.clone();
    base_body.remove("requests");

    entries
        .iter()
        .filter_map(|entry| body_from_entry(&base_body, entry))
        .map(|derived| DispatchUnit {
            field_tags: request_fields_from_params(derived.params_source.as_ref()),
            request: base.with_body(Some(Value::Object(derived.body))),
        })
        .collect()
}

/// Derive the effective body for one `requests[]` entry.
///
/// Entry shapes, checked in order:
/// - `{ "body": ... }`: shallow-merges the override into the base body;
///   takes precedence when `params` is also present
/// - `{ "params": ... }`: replaces the base body's `params` wholesale
/// - any other object: becomes the new `params` itself
/// - a scalar/array: likewise becomes the new `params`
///
/// A `null` entry carries nothing usable and is dropped from the fan-out.
fn body_from_entry(base_body: &Map<String, Value>, entry: &Value) -> Option<DerivedBody> {
    if let Value::Object(entry_map) = entry {
        if let Some(override_body) = entry_map.get("body") {
            let mut merged = base_body.clone();
            if let Value::Object(overrides) = override_body {
                for (key, value) in overrides {
                    merged.insert(key.clone(), value.clone());
                }
            }
            let params_source = merged.get("params").cloned();
            return Some(DerivedBody {
                body: merged,
                params_source,
            });
        }
        if let Some(params) = entry_map.get("params") {
            let mut body = base_body.clone();
            body.insert("params".to_string(), params.clone());
            return Some(DerivedBody {
                body,
                params_source: Some(params.clone()),
            });
        }
    }

    if entry.is_null() {
        return None;
    }

    let mut body = base_body.clone();
    body.insert("params".to_string(), entry.clone());
    Some(DerivedBody {
        body,
        params_source: Some(entry.clone()),
    })
}

fn units_from_params(base: &RequestDescriptor, template: &Map<String, Value>, param_sets: &[Value]) -> Vec<DispatchUnit> {
    let mut base_body = template.clone();
    base_body.remove("params");

    param_sets
        .iter()
        .map(|param_set| {
            let mut body = base_body.clone();
            body.insert("params".to_string(), Value::Array(vec![param_set.clone()]));
            DispatchUnit {
                request: base.with_body(Some(Value::Object(body))),
                field_tags: request_fields_from_params(Some(param_set)),
            }
        })
        .collect()
}
