//! HTTP transport for pivotfeed data sources.
//!
//! This crate owns the single-request boundary of the data layer:
//!
//! - [`DataSourceClient`] issues one request described by a
//!   [`RequestDescriptor`] and returns the parsed JSON body
//! - [`RpcEndpoint`] speaks the backend's RPC convention, a POST of
//!   `{ "method": ..., "params": [...] }` to a fixed base path
//! - [`TransportError`] is the error taxonomy callers see: network,
//!   timeout, non-2xx status, or an undecodable body
//!
//! Timeouts are fixed per call; a timed-out request surfaces as an
//! ordinary [`TransportError::Network`]. No retries happen at this layer.

use std::env;
use std::time::{Duration, Instant};

use pivotfeed_types::RequestDescriptor;
use reqwest::{Client, Method, StatusCode, header};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Timeout applied to every data-source request.
pub const DATA_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout applied to catalog RPC calls.
pub const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable overriding the report catalog base URL.
pub const REPORT_API_BASE_ENV: &str = "PIVOTFEED_REPORT_API_BASE";

/// Errors surfaced by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The configured base URL is not a usable absolute http(s) URL.
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    /// The descriptor's method string is not a valid HTTP method.
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),
    /// Could not construct the underlying HTTP client.
    #[error("could not build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    /// Connection failure, DNS failure, or timeout.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    /// The response body was not valid JSON.
    #[error("invalid JSON in response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Thin wrapper around a configured `reqwest::Client` for data-source access.
///
/// The client pre-configures a JSON `Content-Type`, a cookie store (the
/// backend relies on session cookies), and the fixed data-request timeout.
/// Relative descriptor URLs are resolved against `base_url`; absolute URLs
/// pass through untouched.
#[derive(Debug, Clone)]
pub struct DataSourceClient {
    base_url: String,
    http: Client,
}

impl DataSourceClient {
    /// Construct a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let base_url = base_url.into();
        validate_base_url(&base_url)?;
        let http = build_http_client(DATA_REQUEST_TIMEOUT)?;
        Ok(Self { base_url, http })
    }

    /// Issue a single request and return the parsed JSON response body.
    ///
    /// String bodies are sent verbatim; any other body value is
    /// JSON-serialized. An empty response body decodes to `Value::Null`.
    pub async fn send(&self, descriptor: &RequestDescriptor) -> Result<Value, TransportError> {
        let method = Method::from_bytes(descriptor.method.as_bytes())
            .map_err(|_| TransportError::InvalidMethod(descriptor.method.clone()))?;
        let url = join_url(&self.base_url, &descriptor.url);

        let start = Instant::now();
        debug!(
            method = %method,
            url = %url,
            has_body = descriptor.body.is_some(),
            "data source request started"
        );

        let mut builder = self.http.request(method.clone(), &url);
        for (name, value) in &descriptor.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        match &descriptor.body {
            None => {}
            Some(Value::String(raw)) => builder = builder.body(raw.clone()),
            Some(other) => builder = builder.json(other),
        }

        let response = builder.send().await.map_err(|error| {
            warn!(
                method = %method,
                url = %url,
                error = %error,
                duration_ms = start.elapsed().as_millis(),
                "data source request failed"
            );
            TransportError::Network(error)
        })?;

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(
                method = %method,
                url = %url,
                status = %status,
                duration_ms = start.elapsed().as_millis(),
                "data source request rejected"
            );
            return Err(TransportError::Status { status, body: body_text });
        }

        debug!(
            method = %method,
            url = %url,
            status = %status,
            body_len = body_text.len(),
            duration_ms = start.elapsed().as_millis(),
            "data source request completed"
        );

        parse_response_body(&body_text)
    }
}

/// Client for the backend RPC convention used by catalog endpoints.
///
/// Every call is a POST of `{ "method": ..., "params": [...] }` to the
/// endpoint's base URL; the response envelope varies by endpoint family and
/// is left to the caller to unwrap.
#[derive(Debug, Clone)]
pub struct RpcEndpoint {
    base_url: String,
    http: Client,
}

impl RpcEndpoint {
    /// Construct an RPC client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let base_url = base_url.into();
        validate_base_url(&base_url)?;
        let http = build_http_client(RPC_REQUEST_TIMEOUT)?;
        Ok(Self { base_url, http })
    }

    /// Invoke one RPC method with positional parameters.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let payload = serde_json::json!({ "method": method, "params": params });
        let start = Instant::now();
        debug!(rpc_method = method, url = %self.base_url, "rpc call started");

        let response = self
            .http
            .post(&self.base_url)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                warn!(
                    rpc_method = method,
                    url = %self.base_url,
                    error = %error,
                    duration_ms = start.elapsed().as_millis(),
                    "rpc call failed"
                );
                TransportError::Network(error)
            })?;

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(TransportError::Status { status, body: body_text });
        }

        debug!(
            rpc_method = method,
            status = %status,
            duration_ms = start.elapsed().as_millis(),
            "rpc call completed"
        );

        parse_response_body(&body_text)
    }
}

/// Resolve a base URL from an environment variable, falling back to `default`.
pub fn base_url_from_env(variable: &str, default: &str) -> String {
    env::var(variable)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn build_http_client(timeout: Duration) -> Result<Client, TransportError> {
    let mut default_headers = header::HeaderMap::new();
    default_headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));

    Client::builder()
        .default_headers(default_headers)
        .cookie_store(true)
        .timeout(timeout)
        .build()
        .map_err(TransportError::Build)
}

/// Validate that a base URL is an absolute http(s) URL with a host.
fn validate_base_url(base: &str) -> Result<(), TransportError> {
    let parsed = Url::parse(base).map_err(|error| TransportError::InvalidBaseUrl {
        url: base.to_string(),
        reason: error.to_string(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(TransportError::InvalidBaseUrl {
            url: base.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    if parsed.host_str().is_none() {
        return Err(TransportError::InvalidBaseUrl {
            url: base.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(())
}

/// Join a descriptor URL onto a base URL unless it is already absolute.
fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

fn parse_response_body(body_text: &str) -> Result<Value, TransportError> {
    if body_text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body_text).map_err(TransportError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_base_url_accepts_http_and_https_hosts() {
        assert!(validate_base_url("https://reports.example.com").is_ok());
        assert!(validate_base_url("http://localhost:8080").is_ok());
    }

    #[test]
    fn validate_base_url_rejects_other_schemes_and_relative_urls() {
        assert!(validate_base_url("ftp://example.com").is_err());
        assert!(validate_base_url("/dtj/api/report").is_err());
        assert!(validate_base_url("not a url").is_err());
    }

    #[test]
    fn join_url_resolves_relative_paths_against_base() {
        assert_eq!(join_url("http://host:1", "/dtj/api/plan"), "http://host:1/dtj/api/plan");
        assert_eq!(join_url("http://host:1/", "dtj/api/plan"), "http://host:1/dtj/api/plan");
    }

    #[test]
    fn join_url_passes_absolute_urls_through() {
        assert_eq!(join_url("http://host:1", "https://other/api"), "https://other/api");
    }

    #[test]
    fn base_url_from_env_falls_back_when_unset() {
        let resolved = base_url_from_env("PIVOTFEED_TEST_UNSET_BASE", "http://localhost:9999/dtj/api/report");
        assert_eq!(resolved, "http://localhost:9999/dtj/api/report");
    }

    #[test]
    fn parse_response_body_maps_empty_to_null() {
        assert_eq!(parse_response_body("").unwrap(), Value::Null);
        assert_eq!(parse_response_body("  \n").unwrap(), Value::Null);
    }

    #[test]
    fn parse_response_body_rejects_invalid_json() {
        assert!(matches!(parse_response_body("not json"), Err(TransportError::Decode(_))));
    }
}
