//! Store lifecycle
//!
//! `MemoryManager` is the owned, explicitly initialized handle the rest of an
//! application holds. Concurrent `initialize` calls are coalesced: the first
//! one probes backends and rebuilds the index, the others wait for it and
//! reuse its store.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::config::StoreConfig;
use crate::embedding::BackendKind;
use crate::error::{MemoryError, Result};
use crate::node::{MemoryNode, MemoryNodeBuilder};
use crate::record::VectorRecord;
use crate::search::{SearchOptions, SearchResult};
use crate::snapshot::{ImportOutcome, Snapshot};
use crate::store::{BatchOutcome, RebuildReport, StoreStats, VectorStore};

/// Lifecycle wrapper around a [`VectorStore`]
pub struct MemoryManager {
    config: StoreConfig,
    store: Arc<RwLock<Option<Arc<VectorStore>>>>,
    init_lock: Mutex<()>,
}

impl MemoryManager {
    /// Create an uninitialized manager
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            store: Arc::new(RwLock::new(None)),
            init_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Probe embedding backends, open persistence and rebuild the index.
    ///
    /// A no-op when already initialized. Calls made while another
    /// initialization is in flight wait for it instead of starting a second.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.store.read().await.is_some() {
            log::debug!("Memory store already initialized");
            return Ok(());
        }

        log::info!(
            "Initializing memory store (data dir: {:?}, {}d)",
            self.config.data_dir,
            self.config.dimension
        );
        let store = VectorStore::open(self.config.clone()).await.map_err(|e| {
            log::error!("Memory store initialization failed: {}", e);
            e
        })?;
        log::info!(
            "Memory store ready: {} records, backend {}, {}",
            store.len(),
            store.backend(),
            if store.is_durable() { "durable" } else { "memory-only" }
        );

        *self.store.write().await = Some(Arc::new(store));
        Ok(())
    }

    /// Flush and release the store. Later calls fail until `initialize`.
    pub async fn shutdown(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        let Some(store) = self.store.write().await.take() else {
            return Ok(());
        };
        store.flush()?;
        log::info!("Memory store shut down");
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.store.read().await.is_some()
    }

    /// The underlying store, returning error if not initialized
    pub async fn store_handle(&self) -> Result<Arc<VectorStore>> {
        self.store
            .read()
            .await
            .clone()
            .ok_or(MemoryError::NotInitialized)
    }

    pub async fn store(&self, node: MemoryNode) -> Result<String> {
        self.store_handle().await?.store(node).await
    }

    pub async fn store_batch(&self, nodes: Vec<MemoryNode>) -> Result<BatchOutcome> {
        Ok(self.store_handle().await?.store_batch(nodes).await)
    }

    pub async fn search(&self, query: &str, options: SearchOptions) -> Result<Vec<SearchResult>> {
        self.store_handle().await?.search(query, options).await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<MemoryNode>> {
        self.store_handle().await?.get_by_id(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.store_handle().await?.delete(id).await
    }

    pub async fn delete_batch(&self, ids: &[String]) -> Result<BatchOutcome> {
        Ok(self.store_handle().await?.delete_batch(ids).await)
    }

    pub async fn get_all(&self) -> Result<Vec<VectorRecord>> {
        Ok(self.store_handle().await?.get_all())
    }

    pub async fn find_by_tag(&self, tag: &str) -> Result<Vec<MemoryNode>> {
        Ok(self.store_handle().await?.find_by_tag(tag))
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        Ok(self.store_handle().await?.stats())
    }

    pub async fn export(&self) -> Result<Snapshot> {
        Ok(self.store_handle().await?.export())
    }

    pub async fn import(&self, document: &Value) -> Result<ImportOutcome> {
        self.store_handle().await?.import(document).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store_handle().await?.clear().await
    }

    pub async fn similarity(&self, a: &str, b: &str) -> Result<f32> {
        Ok(self.store_handle().await?.similarity(a, b).await)
    }

    pub async fn rebuild_index(&self) -> Result<RebuildReport> {
        self.store_handle().await?.rebuild_index().await
    }

    pub async fn backend(&self) -> Result<BackendKind> {
        Ok(self.store_handle().await?.backend())
    }

    /// Create a memory builder for convenience
    pub fn builder() -> MemoryNodeBuilder {
        MemoryNode::builder()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_uninitialized() {
        let manager = MemoryManager::new(StoreConfig::offline(16));
        assert!(!manager.is_initialized().await);

        let err = manager.get_by_id("test-id").await.unwrap_err();
        assert!(matches!(err, MemoryError::NotInitialized));
        assert!(manager.search("q", SearchOptions::new()).await.is_err());
        // Shutting down an uninitialized manager is fine
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_initialize_is_coalesced() {
        let server = MockServer::start_async().await;
        let health = server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200).json_body(json!({"status": "healthy"}));
            })
            .await;

        let config = StoreConfig {
            embedding: EmbeddingConfig {
                server_url: Some(server.base_url()),
                health_backoff: Duration::from_millis(10),
                ..EmbeddingConfig::offline()
            },
            ..StoreConfig::offline(8)
        };
        let manager = MemoryManager::new(config);

        let (a, b, c) = tokio::join!(
            manager.initialize(),
            manager.initialize(),
            manager.initialize()
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        health.assert_hits_async(1).await;
        assert_eq!(manager.backend().await.unwrap(), BackendKind::Server);
    }

    #[tokio::test]
    async fn test_lifecycle_survives_restart() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::offline(32);
        config.data_dir = Some(dir.path().to_path_buf());
        let manager = MemoryManager::new(config);

        manager.initialize().await.unwrap();
        let memory = MemoryManager::builder()
            .id("pref-1")
            .content("Prefers metric units")
            .tag("units")
            .build()
            .unwrap();
        assert_eq!(manager.store(memory).await.unwrap(), "pref-1");
        assert_eq!(manager.find_by_tag("units").await.unwrap().len(), 1);

        manager.shutdown().await.unwrap();
        assert!(!manager.is_initialized().await);
        assert!(manager.stats().await.is_err());

        manager.initialize().await.unwrap();
        let loaded = manager.get_by_id("pref-1").await.unwrap().unwrap();
        assert_eq!(loaded.content, "Prefers metric units");
        assert_eq!(manager.stats().await.unwrap().total_records, 1);
    }
}
