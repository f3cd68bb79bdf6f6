//! Shared type definitions for the pivotfeed data layer.
//!
//! These types travel between the source catalog, the transport layer, and
//! the fan-out engine. `SourceDefinition` is the persisted shape owned by
//! the catalog; `RequestDescriptor` is the per-fetch snapshot the engine
//! actually dispatches.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A saved remote data source, as stored by the report builder's catalog.
///
/// Field names follow the backend's camelCase convention so definitions can
/// be decoded straight out of catalog responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDefinition {
    /// Stable identifier assigned by the catalog.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Endpoint URL the source reads from.
    pub url: String,
    /// HTTP method as stored (e.g., "POST"); normalized on descriptor build.
    #[serde(default)]
    pub http_method: String,
    /// Raw request-body template. Usually a JSON document, but treated as an
    /// opaque string until the analyzer parses it.
    #[serde(default)]
    pub raw_body: String,
    /// Extra request headers, in insertion order.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Whether records from this source can feed pivot tables.
    #[serde(default = "default_supports_pivot")]
    pub supports_pivot: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_supports_pivot() -> bool {
    true
}

impl SourceDefinition {
    /// Build the base request descriptor for one fetch of this source.
    ///
    /// The stored body template is carried as an opaque string value here;
    /// splitting and parsing are the analyzer's job.
    pub fn to_request(&self) -> RequestDescriptor {
        let body = if self.raw_body.trim().is_empty() {
            None
        } else {
            Some(Value::String(self.raw_body.clone()))
        };
        RequestDescriptor {
            url: self.url.clone(),
            method: normalize_method(&self.http_method),
            headers: self.headers.clone(),
            body,
        }
    }
}

/// One concrete HTTP request the transport layer knows how to send.
///
/// The body is free-form: a string is sent verbatim, anything else is
/// JSON-serialized by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl RequestDescriptor {
    /// Copy of this descriptor with a different body, same endpoint.
    pub fn with_body(&self, body: Option<Value>) -> Self {
        Self {
            url: self.url.clone(),
            method: self.method.clone(),
            headers: self.headers.clone(),
            body,
        }
    }
}

/// Uppercase a stored method string, defaulting to GET when absent.
pub fn normalize_method(method: &str) -> String {
    let trimmed = method.trim();
    if trimmed.is_empty() {
        "GET".to_string()
    } else {
        trimmed.to_ascii_uppercase()
    }
}

/// Options for a single `fetch_remote_records` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip the cache and re-dispatch even when a fresh entry exists.
    pub force_refresh: bool,
}
