//! Schema Providers
//!
//! `SchemaProvider` is the capability the orchestrator consumes. The cache
//! keeps one immutable snapshot behind an `Arc`; reloads swap the whole
//! snapshot so concurrent readers never see a half-built descriptor.

use crate::error::Result;
use crate::schema::descriptor::SchemaDescriptor;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// `Ok(None)` (or an empty descriptor) signals that no schema is available.
    async fn fetch(&self) -> Result<Option<Arc<SchemaDescriptor>>>;

    /// Snapshot already held in memory, if any. Must not block or do I/O.
    fn cached(&self) -> Option<Arc<SchemaDescriptor>> {
        None
    }
}

/// Serves a fixed descriptor. Useful for tests and for callers that load
/// schema from a file.
pub struct StaticSchemaProvider {
    schema: Option<Arc<SchemaDescriptor>>,
}

impl StaticSchemaProvider {
    pub fn new(schema: SchemaDescriptor) -> Self {
        Self {
            schema: Some(Arc::new(schema)),
        }
    }

    pub fn unavailable() -> Self {
        Self { schema: None }
    }
}

#[async_trait]
impl SchemaProvider for StaticSchemaProvider {
    async fn fetch(&self) -> Result<Option<Arc<SchemaDescriptor>>> {
        Ok(self.schema.clone())
    }
}

/// Read-mostly cache in front of another provider (typically database introspection).
pub struct CachedSchemaProvider {
    source: Arc<dyn SchemaProvider>,
    cached: RwLock<Option<Arc<SchemaDescriptor>>>,
}

impl CachedSchemaProvider {
    pub fn new(source: Arc<dyn SchemaProvider>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
        }
    }

    /// Current snapshot without touching the source.
    pub async fn snapshot(&self) -> Option<Arc<SchemaDescriptor>> {
        self.cached.read().await.clone()
    }

    /// Replace the cached snapshot (e.g. after a reconnect).
    pub async fn replace(&self, schema: SchemaDescriptor) {
        info!("Loading schema into cache: {} table(s)", schema.table_count());
        *self.cached.write().await = Some(Arc::new(schema));
    }

    pub async fn clear(&self) {
        info!("Clearing cached schema");
        *self.cached.write().await = None;
    }

    /// Fetch from the source unconditionally and swap the snapshot if non-empty.
    pub async fn reload(&self) -> Result<Option<Arc<SchemaDescriptor>>> {
        let fetched = self.source.fetch().await?;
        match fetched {
            Some(schema) if !schema.is_empty() => {
                info!("Schema reloaded: {} table(s)", schema.table_count());
                *self.cached.write().await = Some(Arc::clone(&schema));
                Ok(Some(schema))
            }
            _ => {
                warn!("Schema source returned no tables; keeping previous snapshot");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl SchemaProvider for CachedSchemaProvider {
    async fn fetch(&self) -> Result<Option<Arc<SchemaDescriptor>>> {
        if let Some(schema) = self.snapshot().await {
            debug!("Serving schema from cache");
            return Ok(Some(schema));
        }
        debug!("Schema not cached, fetching from source");
        self.reload().await
    }

    fn cached(&self) -> Option<Arc<SchemaDescriptor>> {
        // A writer holding the lock means a swap is in progress; report a miss.
        self.cached.try_read().ok().and_then(|guard| guard.clone())
    }
}
