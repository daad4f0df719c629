//! Vector memory store
//!
//! Long-term semantic memory for a conversational assistant: short text
//! fragments are embedded, indexed in an HNSW graph and persisted in RocksDB,
//! then retrieved by semantic similarity.
//!
//! ## Features
//!
//! - **Resilient embeddings** - embedding server, remote API, in-process model, deterministic hash fallback
//! - **HNSW index** - approximate k-NN search, rebuilt from persistence on startup
//! - **RocksDB persistence** - batched writes, degrades to memory-only when unavailable
//! - **Portable snapshots** - JSON export/import with per-record error accounting
//!
//! ## Example
//!
//! ```ignore
//! use vecmem::{MemoryManager, MemoryNode, SearchOptions, StoreConfig};
//!
//! let manager = MemoryManager::new(StoreConfig::from_env());
//! manager.initialize().await?;
//!
//! let memory = MemoryNode::builder()
//!     .id("m1")
//!     .content("My favorite color is blue")
//!     .tag("preferences")
//!     .build()?;
//! manager.store(memory).await?;
//!
//! let hits = manager.search("what color do I like", SearchOptions::new()).await?;
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod hnsw;
pub mod manager;
pub mod math;
pub mod migration;
pub mod node;
pub mod record;
pub mod search;
pub mod snapshot;
pub mod storage;
pub mod store;

// Re-exports for convenience
pub use config::{EmbeddingConfig, HnswConfig, StoreConfig};
pub use embedding::{BackendKind, EmbeddingEngine};
pub use error::{MemoryError, Result};
pub use hnsw::HnswIndex;
pub use manager::MemoryManager;
pub use node::{MemoryKind, MemoryNode, MemoryNodeBuilder, MemoryNodeBuilderError};
pub use record::{RecordMetadata, VectorRecord};
pub use search::{SearchOptions, SearchResult};
pub use snapshot::{ImportOutcome, Snapshot};
pub use storage::RecordStore;
pub use store::{BatchOutcome, RebuildReport, StoreStats, VectorStore};
