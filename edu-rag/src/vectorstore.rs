//! Vector store capability contract.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{DocumentChunk, MetadataFilter, RetrievalResult, StoreStats};
use crate::error::Result;

/// The operating mode of a vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// `initialize()` has not run yet.
    Uninitialized,
    /// Backed by a reachable index.
    Live,
    /// No backend available: inserts and deletes are no-ops, queries are empty.
    Degraded,
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Live => f.write_str("live"),
            Self::Degraded => f.write_str("degraded"),
        }
    }
}

/// A storage backend for chunk vectors with similarity search.
///
/// Live backends and the degraded stand-in implement the same contract, so
/// callers never branch on availability. Distances returned by
/// [`query`](VectorStore::query) are normalized so `0` means identical and
/// `1` or more means unrelated.
///
/// # Example
///
/// ```rust,ignore
/// use edu_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.initialize().await?;
/// store.insert(&chunks, &embeddings).await?;
/// let results = store.query(&query_embedding, 5, None).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Establish or confirm the backing index. Idempotent.
    async fn initialize(&self) -> Result<()>;

    /// Store `(id, embedding, content, metadata)` for each chunk.
    ///
    /// `chunks` and `embeddings` are parallel slices of equal length.
    async fn insert(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<()>;

    /// Return up to `k` entries nearest to `embedding`, most similar first.
    ///
    /// The returned results carry a zero `relevance_score`; ranking fills it in.
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>>;

    /// Remove every entry whose `source_name` equals `source_name`.
    async fn delete_by_source(&self, source_name: &str) -> Result<()>;

    /// Entry count and distinct subjects.
    async fn stats(&self) -> Result<StoreStats>;

    /// Current operating mode.
    fn mode(&self) -> StoreMode;

    /// Short backend name used in logs and errors.
    fn backend(&self) -> &str;
}
