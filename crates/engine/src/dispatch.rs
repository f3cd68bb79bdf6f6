//! Concurrent fan-out and ordered merge.

use anyhow::{Context, Result};
use futures_util::future::try_join_all;
use pivotfeed_api::DataSourceClient;
use pivotfeed_types::RequestDescriptor;
use serde_json::Value;
use tracing::debug;

use crate::body::build_dispatch_units;
use crate::fields::apply_request_fields;
use crate::normalize::extract_records;

/// Dispatch one base request, fanning out when its body template asks for
/// it, and merge all responses into a single record set.
///
/// Sub-requests run concurrently with no mutual ordering; the merged output
/// follows request-definition order, not arrival order. Any sub-request
/// failure fails the whole dispatch; there is no partial-success merge.
pub async fn dispatch(client: &DataSourceClient, base: &RequestDescriptor) -> Result<Vec<Value>> {
    let units = build_dispatch_units(base);
    if units.is_empty() {
        // A template that advertised a fan-out but produced no usable
        // entries degrades to the original request, unchanged.
        debug!(url = %base.url, "no usable fan-out entries, sending original request");
        let response = client
            .send(base)
            .await
            .with_context(|| format!("request to '{}' failed", base.url))?;
        return Ok(extract_records(&response));
    }

    debug!(url = %base.url, unit_count = units.len(), "dispatching data source request");
    let responses = try_join_all(units.iter().map(|unit| client.send(&unit.request)))
        .await
        .with_context(|| format!("request to '{}' failed", base.url))?;

    let mut merged = Vec::new();
    for (unit, response) in units.iter().zip(responses) {
        let records = extract_records(&response);
        merged.extend(apply_request_fields(records, &unit.field_tags));
    }
    Ok(merged)
}
