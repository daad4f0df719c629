//! Embedding pipeline
//!
//! Turns text into fixed-dimension unit vectors. Backends are tried in
//! priority order at startup (server, API, local model, hash) and results
//! are cached by content.

mod api;
mod cache;
mod discovery;
mod engine;
mod hash;
mod local;
mod server;

pub use api::ApiEmbedder;
pub use cache::{CacheStats, EmbeddingCache};
pub use discovery::find_model_cache_dir;
pub use engine::{BackendKind, EmbeddingBackend, EmbeddingEngine};
pub use hash::hash_embedding;
pub use local::{LocalEmbedder, TextEncoder};
pub use server::{ServerEmbedder, MAX_TEXTS_PER_REQUEST, MAX_TEXT_CHARS};
