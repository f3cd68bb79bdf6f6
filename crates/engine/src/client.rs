//! Cached remote-source client.
//!
//! The surface the report builder consumes: fetch records for a source,
//! warm the cache for every known source, drop the cache on demand. The
//! cache is plain owned state on the client, constructed by the embedding
//! application; there is no module-level singleton.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use pivotfeed_api::DataSourceClient;
use pivotfeed_types::{FetchOptions, SourceDefinition};
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::SourceCatalog;
use crate::dispatch::dispatch;

/// Cached fetch/preload surface over the fan-out engine.
pub struct RemoteSourceClient {
    transport: DataSourceClient,
    catalog: Arc<dyn SourceCatalog>,
    cache: Mutex<HashMap<String, Arc<Vec<Value>>>>,
}

impl RemoteSourceClient {
    pub fn new(transport: DataSourceClient, catalog: Arc<dyn SourceCatalog>) -> Self {
        Self {
            transport,
            catalog,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the merged record set for one source.
    ///
    /// Short-circuits to the cache when an entry exists for the same source
    /// identity and request shape, unless `force_refresh` is set. The cache
    /// is only written after every sub-request has settled.
    pub async fn fetch_remote_records(&self, source: &SourceDefinition, options: &FetchOptions) -> Result<Arc<Vec<Value>>> {
        let key = cache_key(source);
        if !options.force_refresh {
            let cache = self.cache.lock().expect("record cache poisoned");
            if let Some(cached) = cache.get(&key) {
                debug!(source_id = %source.id, "record cache hit");
                return Ok(Arc::clone(cached));
            }
        }

        let records = dispatch(&self.transport, &source.to_request())
            .await
            .with_context(|| format!("fetch records for source '{}'", source.id))?;
        let records = Arc::new(records);
        self.cache
            .lock()
            .expect("record cache poisoned")
            .insert(key, Arc::clone(&records));
        Ok(records)
    }

    /// Warm the cache for every source the catalog knows about.
    ///
    /// Individual source failures are logged and skipped so one dead
    /// endpoint cannot abort the warmup. Returns the number of sources
    /// warmed. Callers who do not need the result can spawn this future and
    /// move on.
    pub async fn preload_remote_sources(&self) -> Result<usize> {
        let sources = self.catalog.load_sources().await.context("preload remote sources")?;
        let mut warmed = 0;
        for source in &sources {
            match self.fetch_remote_records(source, &FetchOptions::default()).await {
                Ok(_) => warmed += 1,
                Err(error) => {
                    warn!(source_id = %source.id, error = %error, "preload skipped source");
                }
            }
        }
        debug!(warmed, total = sources.len(), "remote source preload finished");
        Ok(warmed)
    }

    /// Drop every cached record set.
    pub fn clear_cache(&self) {
        self.cache.lock().expect("record cache poisoned").clear();
    }
}

/// Cache key: source identity plus a fingerprint of the request shape, so
/// an edited source misses its stale entry instead of serving it.
fn cache_key(source: &SourceDefinition) -> String {
    let mut hasher = DefaultHasher::new();
    source.url.hash(&mut hasher);
    source.http_method.hash(&mut hasher);
    source.raw_body.hash(&mut hasher);
    format!("{}::{:016x}", source.id, hasher.finish())
}
