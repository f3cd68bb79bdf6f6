//! Source-catalog collaborator boundary.
//!
//! The catalog owns saved source definitions; this layer only reads them.
//! The trait keeps the engine testable without a live backend, and the RPC
//! implementation speaks the backend's report endpoint convention.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pivotfeed_api::RpcEndpoint;
use pivotfeed_types::SourceDefinition;
use serde_json::json;
use tracing::warn;

use crate::normalize::extract_records;

/// RPC method listing all saved report sources.
pub const LOAD_REPORT_SOURCE_METHOD: &str = "report/loadReportSource";

/// Read-only supplier of saved source definitions.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    async fn load_sources(&self) -> Result<Vec<SourceDefinition>>;
}

/// Catalog backed by the report RPC endpoint.
pub struct RpcSourceCatalog {
    endpoint: RpcEndpoint,
}

impl RpcSourceCatalog {
    pub fn new(endpoint: RpcEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl SourceCatalog for RpcSourceCatalog {
    async fn load_sources(&self) -> Result<Vec<SourceDefinition>> {
        let envelope = self
            .endpoint
            .call(LOAD_REPORT_SOURCE_METHOD, vec![json!(0)])
            .await
            .context("load report sources")?;

        let sources = extract_records(&envelope)
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<SourceDefinition>(record) {
                Ok(source) => Some(source),
                Err(error) => {
                    warn!(error = %error, "skipping malformed source record");
                    None
                }
            })
            .collect();
        Ok(sources)
    }
}
