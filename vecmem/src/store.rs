//! Vector store facade
//!
//! Owns the embedding engine, the durable record store and two derived
//! structures: an in-memory record cache and the HNSW index. Both derived
//! structures can be dropped and rebuilt from persistence at any time.

use std::collections::{BTreeMap, HashSet};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::config::StoreConfig;
use crate::embedding::{BackendKind, CacheStats, EmbeddingEngine};
use crate::error::Result;
use crate::hnsw::HnswIndex;
use crate::node::MemoryNode;
use crate::record::VectorRecord;
use crate::search::{rank, SearchOptions, SearchResult};
use crate::snapshot::{parse_snapshot, ImportOutcome, Snapshot};
use crate::storage::RecordStore;

/// Per-item outcome counts of a batch operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub success: usize,
    pub failed: usize,
}

/// What an index rebuild found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    /// Records now indexed
    pub indexed: usize,
    /// Persisted entries that could not be decoded
    pub skipped: usize,
    /// Records whose vector had the wrong dimension and were re-embedded
    pub reembedded: usize,
}

/// Store-wide statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_records: usize,
    pub indexed_nodes: usize,
    pub index_levels: usize,
    pub dimension: usize,
    pub estimated_bytes: usize,
    pub backend: BackendKind,
    pub durable: bool,
    pub by_kind: BTreeMap<String, usize>,
    pub by_tag: BTreeMap<String, usize>,
    pub embedding_cache: CacheStats,
}

/// Semantic memory store
pub struct VectorStore {
    config: StoreConfig,
    engine: EmbeddingEngine,
    storage: RecordStore,
    records: DashMap<String, VectorRecord>,
    index: RwLock<HnswIndex>,
}

impl VectorStore {
    /// Probe embedding backends, open persistence and rebuild the index
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let engine = EmbeddingEngine::initialize(&config.embedding, config.dimension).await;
        Self::with_engine(config, engine).await
    }

    /// Like [`open`](Self::open) with an already initialized engine
    pub async fn with_engine(config: StoreConfig, engine: EmbeddingEngine) -> Result<Self> {
        let storage = RecordStore::open_or_memory(config.data_dir.as_deref());
        let store = Self {
            index: RwLock::new(HnswIndex::new(config.hnsw.clone())),
            records: DashMap::new(),
            config,
            engine,
            storage,
        };
        store.rebuild_index().await?;
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Active embedding backend
    pub fn backend(&self) -> BackendKind {
        self.engine.kind()
    }

    pub fn is_durable(&self) -> bool {
        self.storage.is_durable()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn embedding_cache_stats(&self) -> CacheStats {
        self.engine.cache().stats()
    }

    /// Drop the record cache and index and replay persistence.
    ///
    /// Memory-only stores re-index their record cache instead, since it is
    /// the only copy.
    pub async fn rebuild_index(&self) -> Result<RebuildReport> {
        if !self.storage.is_durable() {
            let mut index = self.index.write();
            index.clear();
            for entry in self.records.iter() {
                index.insert(entry.key(), entry.value().vector.clone());
            }
            return Ok(RebuildReport {
                indexed: index.len(),
                ..Default::default()
            });
        }

        let loaded = self.storage.get_all()?;
        let mut report = RebuildReport {
            skipped: loaded.skipped,
            ..Default::default()
        };

        let dimension = self.config.dimension;
        let (mut records, stale): (Vec<_>, Vec<_>) = loaded
            .records
            .into_iter()
            .partition(|r| r.vector.len() == dimension);

        if !stale.is_empty() {
            log::warn!(
                "Re-embedding {} records stored with a different dimension",
                stale.len()
            );
            let repaired = self.embed_records(stale).await;
            let write = self.storage.put_batch(&repaired);
            if !write.failed.is_empty() {
                log::warn!(
                    "{} re-embedded records could not be rewritten",
                    write.failed.len()
                );
            }
            report.reembedded = repaired.len();
            records.extend(repaired);
        }

        {
            let mut index = self.index.write();
            index.clear();
            self.records.clear();
            for record in records {
                index.insert(&record.id, record.vector.clone());
                self.records.insert(record.id.clone(), record);
            }
            report.indexed = index.len();
        }

        log::info!(
            "Index rebuilt: {} records ({} skipped, {} re-embedded)",
            report.indexed,
            report.skipped,
            report.reembedded
        );
        Ok(report)
    }

    /// Embed and persist one memory. Overwrites any record with the same id.
    pub async fn store(&self, node: MemoryNode) -> Result<String> {
        node.validate()?;
        let vector = self.engine.embed(&node.content).await;
        let record = VectorRecord::from_node(node, vector);
        let id = record.id.clone();

        self.storage.put(&record)?;
        self.index_record(record);
        Ok(id)
    }

    /// Store many memories in chunks of `batch_size`.
    ///
    /// Each chunk is embedded together and written with one batch write.
    /// Malformed nodes and failed writes are counted, never raised.
    pub async fn store_batch(&self, nodes: Vec<MemoryNode>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let chunk_size = self.config.batch_size.max(1);
        let mut pending = nodes.into_iter().peekable();

        while pending.peek().is_some() {
            let chunk: Vec<MemoryNode> = pending.by_ref().take(chunk_size).collect();
            let valid: Vec<MemoryNode> = chunk
                .into_iter()
                .filter(|node| match node.validate() {
                    Ok(()) => true,
                    Err(e) => {
                        log::warn!("Rejecting memory {:?}: {}", node.id, e);
                        outcome.failed += 1;
                        false
                    }
                })
                .collect();

            let texts: Vec<String> = valid.iter().map(|n| n.content.clone()).collect();
            let vectors = self.engine.embed_batch(&texts).await;
            let records: Vec<VectorRecord> = valid
                .into_iter()
                .zip(vectors)
                .map(|(node, vector)| VectorRecord::from_node(node, vector))
                .collect();

            let report = self.storage.put_batch(&records);
            let failed: HashSet<&str> = report.failed.iter().map(String::as_str).collect();
            outcome.failed += failed.len();
            let stored: Vec<VectorRecord> = records
                .into_iter()
                .filter(|r| !failed.contains(r.id.as_str()))
                .collect();
            outcome.success += stored.len();
            for record in stored {
                self.index_record(record);
            }

            tokio::task::yield_now().await;
        }

        log::debug!(
            "Batch store: {} stored, {} failed",
            outcome.success,
            outcome.failed
        );
        outcome
    }

    /// Semantic search, best match first
    pub async fn search(&self, query: &str, options: SearchOptions) -> Result<Vec<SearchResult>> {
        let limit = options.max_results.unwrap_or(self.config.max_results);
        let min_score = options.min_score.unwrap_or(self.config.similarity_threshold);
        if limit == 0 || self.records.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.engine.embed(query).await;

        let mut ef = self.config.hnsw.ef_search.max(limit);
        if options.is_filtered() {
            // Filters discard candidates after the graph search; widen the pool
            ef = ef.max(limit.saturating_mul(4));
        }
        let candidate_ids = self.index.read().search(&query_vector, ef);
        let candidates: Vec<VectorRecord> = candidate_ids
            .iter()
            .filter_map(|id| self.lookup(id))
            .collect();

        let results = rank(&query_vector, &candidates, &options, min_score, limit)
            .into_iter()
            .filter_map(|(id, score)| self.touch(&id).map(|node| SearchResult { node, score }))
            .collect();
        Ok(results)
    }

    /// Fetch a memory and record the access
    pub async fn get_by_id(&self, id: &str) -> Result<Option<MemoryNode>> {
        if !self.records.contains_key(id) {
            // Persisted but not cached: adopt it
            match self.storage.get(id)? {
                Some(record) => self.index_record(record),
                None => return Ok(None),
            }
        }
        Ok(self.touch(id))
    }

    /// Remove a memory. Returns false if it did not exist.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let persisted = matches!(self.storage.get(id), Ok(Some(_)));
        self.storage.delete(id)?;
        let cached = self.records.remove(id).is_some();
        self.index.write().remove(id);
        Ok(cached || persisted)
    }

    /// Delete many ids; unknown ids and errors count as failed
    pub async fn delete_batch(&self, ids: &[String]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for id in ids {
            match self.delete(id).await {
                Ok(true) => outcome.success += 1,
                Ok(false) => outcome.failed += 1,
                Err(e) => {
                    log::warn!("Failed to delete {}: {}", id, e);
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    /// Every record, oldest first
    pub fn get_all(&self) -> Vec<VectorRecord> {
        let mut records: Vec<VectorRecord> =
            self.records.iter().map(|e| e.value().clone()).collect();
        records.sort_by(|a, b| {
            a.metadata
                .created
                .cmp(&b.metadata.created)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    /// Memories carrying `tag`
    pub fn find_by_tag(&self, tag: &str) -> Vec<MemoryNode> {
        let mut nodes: Vec<MemoryNode> = self
            .records
            .iter()
            .filter(|entry| entry.value().metadata.tags.contains(tag))
            .map(|entry| entry.value().to_node())
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    pub fn stats(&self) -> StoreStats {
        let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_tag: BTreeMap<String, usize> = BTreeMap::new();
        let mut estimated_bytes = 0;

        for entry in self.records.iter() {
            let record = entry.value();
            estimated_bytes += record.estimated_bytes();
            *by_kind
                .entry(record.metadata.kind.as_str().to_string())
                .or_insert(0) += 1;
            for tag in &record.metadata.tags {
                *by_tag.entry(tag.clone()).or_insert(0) += 1;
            }
        }

        let index = self.index.read();
        StoreStats {
            total_records: self.records.len(),
            indexed_nodes: index.len(),
            index_levels: if index.is_empty() { 0 } else { index.top_level() + 1 },
            dimension: self.config.dimension,
            estimated_bytes,
            backend: self.backend(),
            durable: self.is_durable(),
            by_kind,
            by_tag,
            embedding_cache: self.embedding_cache_stats(),
        }
    }

    /// Snapshot of every record
    pub fn export(&self) -> Snapshot {
        Snapshot::new(self.backend(), self.get_all())
    }

    /// Import a snapshot document.
    ///
    /// Malformed entries are counted in `errors`. Vectors of the wrong
    /// dimension are re-embedded from their content.
    pub async fn import(&self, document: &Value) -> Result<ImportOutcome> {
        let parsed = parse_snapshot(document)?;
        let mut outcome = ImportOutcome {
            imported: 0,
            errors: parsed.errors,
        };

        let dimension = self.config.dimension;
        let chunk_size = self.config.batch_size.max(1);
        let mut pending = parsed.records.into_iter().peekable();

        while pending.peek().is_some() {
            let chunk: Vec<VectorRecord> = pending.by_ref().take(chunk_size).collect();
            let (mut records, stale): (Vec<_>, Vec<_>) = chunk
                .into_iter()
                .partition(|r| r.vector.len() == dimension && r.vector.iter().all(|v| v.is_finite()));
            records.extend(self.embed_records(stale).await);

            let report = self.storage.put_batch(&records);
            let failed: HashSet<&str> = report.failed.iter().map(String::as_str).collect();
            outcome.errors += failed.len();
            let stored: Vec<VectorRecord> = records
                .into_iter()
                .filter(|r| !failed.contains(r.id.as_str()))
                .collect();
            outcome.imported += stored.len();
            for record in stored {
                self.index_record(record);
            }

            tokio::task::yield_now().await;
        }

        if outcome.errors > 0 {
            log::warn!(
                "Imported {} records with {} errors",
                outcome.imported,
                outcome.errors
            );
        } else {
            log::info!("Imported {} records", outcome.imported);
        }
        Ok(outcome)
    }

    /// Import from JSON text
    pub async fn import_str(&self, json: &str) -> Result<ImportOutcome> {
        let document: Value = serde_json::from_str(json)?;
        self.import(&document).await
    }

    /// Wipe persisted records, the index and the embedding cache
    pub async fn clear(&self) -> Result<()> {
        let removed = self.storage.clear()?;
        self.index.write().clear();
        self.records.clear();
        self.engine.cache().clear();
        log::info!("Cleared store ({} persisted records removed)", removed);
        Ok(())
    }

    /// Cosine similarity between two texts
    pub async fn similarity(&self, a: &str, b: &str) -> f32 {
        self.engine.similarity(a, b).await
    }

    /// Flush persistence
    pub fn flush(&self) -> Result<()> {
        self.storage.flush()
    }

    fn index_record(&self, record: VectorRecord) {
        self.index.write().insert(&record.id, record.vector.clone());
        self.records.insert(record.id.clone(), record);
    }

    fn lookup(&self, id: &str) -> Option<VectorRecord> {
        if let Some(record) = self.records.get(id) {
            return Some(record.value().clone());
        }
        match self.storage.get(id) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Failed to read record {}: {}", id, e);
                None
            }
        }
    }

    /// Bump access bookkeeping, persisting best-effort
    fn touch(&self, id: &str) -> Option<MemoryNode> {
        let record = {
            let mut entry = self.records.get_mut(id)?;
            entry.touch();
            entry.value().clone()
        };
        if let Err(e) = self.storage.put(&record) {
            log::warn!("Failed to persist access time for {}: {}", id, e);
        }
        Some(record.to_node())
    }

    /// Fresh vectors for records from their stored content
    async fn embed_records(&self, records: Vec<VectorRecord>) -> Vec<VectorRecord> {
        if records.is_empty() {
            return records;
        }
        let texts: Vec<String> = records.iter().map(|r| r.metadata.content.clone()).collect();
        let vectors = self.engine.embed_batch(&texts).await;
        records
            .into_iter()
            .zip(vectors)
            .map(|(mut record, vector)| {
                record.vector = vector;
                record
            })
            .collect()
    }
}
