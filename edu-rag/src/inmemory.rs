//! In-memory vector store using cosine distance.
//!
//! This module provides [`InMemoryVectorStore`], a dependency-free live backend
//! backed by an id-indexed `Vec` protected by a `tokio::sync::RwLock`. It is suitable for
//! development, testing, and single-node deployments without a vector server.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{
    ChunkMetadata, DocumentChunk, MetadataFilter, RetrievalResult, StoreStats,
};
use crate::error::{RagError, Result};
use crate::vectorstore::{StoreMode, VectorStore};

const BACKEND: &str = "InMemory";

/// A stored `(id, embedding, content, metadata)` tuple.
#[derive(Debug, Clone)]
struct IndexEntry {
    id: String,
    embedding: Vec<f32>,
    content: String,
    metadata: ChunkMetadata,
}

/// An in-memory [`VectorStore`] ranking by cosine distance.
///
/// Entries keep insertion order, so equal distances come back in the order
/// they were stored. Inserting an existing id replaces the entry wholesale.
///
/// # Example
///
/// ```rust,ignore
/// use edu_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.initialize().await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    index: RwLock<Index>,
    initialized: AtomicBool,
}

/// Entries in insertion order plus each id's position.
#[derive(Debug, Default)]
struct Index {
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
}

impl Index {
    fn upsert(&mut self, entry: IndexEntry) {
        match self.positions.get(&entry.id) {
            Some(&at) => self.entries[at] = entry,
            None => {
                self.positions.insert(entry.id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    fn retain(&mut self, keep: impl FnMut(&IndexEntry) -> bool) {
        self.entries.retain(keep);
        self.positions =
            self.entries.iter().enumerate().map(|(at, e)| (e.id.clone(), at)).collect();
    }
}

impl InMemoryVectorStore {
    /// Create a new, uninitialized in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(RagError::NotInitialized { backend: BACKEND.to_string() })
        }
    }
}

/// Cosine distance `1 − cos(a, b)`, in `[0, 2]`.
///
/// Returns 1.0 (orthogonal) if either vector has zero magnitude.
pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
}

fn store_error(message: String) -> RagError {
    RagError::VectorStoreError { backend: BACKEND.to_string(), message }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn initialize(&self) -> Result<()> {
        if !self.initialized.swap(true, Ordering::AcqRel) {
            debug!(backend = BACKEND, "initialized vector store");
        }
        Ok(())
    }

    async fn insert(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<()> {
        self.ensure_initialized()?;
        if chunks.len() != embeddings.len() {
            return Err(store_error(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let mut index = self.index.write().await;
        let expected = index
            .entries
            .first()
            .map(|e| e.embedding.len())
            .or_else(|| embeddings.first().map(Vec::len));
        if let Some(expected) = expected {
            if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
                return Err(store_error(format!(
                    "embedding has {} dimensions, index holds {expected}",
                    bad.len()
                )));
            }
        }

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let entry = IndexEntry {
                id: chunk.id.clone(),
                embedding: embedding.clone(),
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
            };
            index.upsert(entry);
        }

        debug!(backend = BACKEND, count = chunks.len(), "inserted chunks");
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        self.ensure_initialized()?;
        let index = self.index.read().await;

        let mut scored: Vec<RetrievalResult> = index
            .entries
            .iter()
            .filter(|e| filter.is_none_or(|f| f.matches(&e.metadata)))
            .map(|e| RetrievalResult {
                content: e.content.clone(),
                metadata: e.metadata.clone(),
                distance: cosine_distance(&e.embedding, embedding),
                relevance_score: 0.0,
            })
            .collect();

        // Stable sort: ties keep insertion order.
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_by_source(&self, source_name: &str) -> Result<()> {
        self.ensure_initialized()?;
        let mut index = self.index.write().await;
        let before = index.entries.len();
        index.retain(|e| e.metadata.source_name != source_name);
        let removed = before - index.entries.len();
        debug!(backend = BACKEND, source_name, removed, "deleted source");
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.ensure_initialized()?;
        let index = self.index.read().await;
        let subjects: BTreeSet<&str> =
            index.entries.iter().filter_map(|e| e.metadata.subject.as_deref()).collect();
        Ok(StoreStats {
            count: index.entries.len(),
            distinct_subjects: subjects.into_iter().map(str::to_string).collect(),
        })
    }

    fn mode(&self) -> StoreMode {
        if self.initialized.load(Ordering::Acquire) { StoreMode::Live } else { StoreMode::Uninitialized }
    }

    fn backend(&self) -> &str {
        BACKEND
    }
}
