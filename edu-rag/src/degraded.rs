//! The vector store used when no backend is reachable.

use async_trait::async_trait;
use tracing::debug;

use crate::document::{DocumentChunk, MetadataFilter, RetrievalResult, StoreStats};
use crate::error::Result;
use crate::vectorstore::{StoreMode, VectorStore};

/// A [`VectorStore`] with nothing behind it.
///
/// Every operation succeeds: inserts and deletes are dropped, queries return
/// no results and stats are empty. Retrieval therefore yields no context while
/// ingestion and chat keep working.
#[derive(Debug, Clone, Copy, Default)]
pub struct DegradedVectorStore;

#[async_trait]
impl VectorStore for DegradedVectorStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, chunks: &[DocumentChunk], _embeddings: &[Vec<f32>]) -> Result<()> {
        debug!(count = chunks.len(), "degraded store dropping insert");
        Ok(())
    }

    async fn query(
        &self,
        _embedding: &[f32],
        _k: usize,
        _filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        Ok(Vec::new())
    }

    async fn delete_by_source(&self, source_name: &str) -> Result<()> {
        debug!(source_name, "degraded store ignoring delete");
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats::default())
    }

    fn mode(&self) -> StoreMode {
        StoreMode::Degraded
    }

    fn backend(&self) -> &str {
        "degraded"
    }
}
