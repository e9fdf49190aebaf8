//! Deterministic fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use edu_rag::{
    DocumentChunk, EmbeddingProvider, InMemoryVectorStore, MetadataFilter, RagError, Result,
    RetrievalResult, StoreMode, StoreStats, VectorStore,
};

pub const DIM: usize = 16;

/// Deterministic pseudo-random embedding seeded by the text, L2-normalized.
///
/// Identical texts map to identical vectors; distinct texts land close to
/// orthogonal.
pub fn hash_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let mut state = text
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |acc, b| (acc ^ b as u64).wrapping_mul(0x0100_0000_01b3))
        | 1;
    let mut emb = vec![0.0f32; dimensions];
    for v in emb.iter_mut() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        *v = (state >> 40) as f32 / (1u64 << 24) as f32 * 2.0 - 1.0;
    }
    let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        emb.iter_mut().for_each(|x| *x /= norm);
    }
    emb
}

/// Hash embeddings, with fixed vectors for selected texts.
#[derive(Default)]
pub struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
    pub calls: AtomicUsize,
}

impl TableEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.table.get(text).cloned().unwrap_or_else(|| hash_embedding(text, DIM)))
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn model_id(&self) -> &str {
        "mock-table"
    }
}

/// A unit vector in the first two dimensions with cosine `cos` to `[1, 0, ...]`.
pub fn at_cosine(cos: f32) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[0] = cos;
    v[1] = (1.0 - cos * cos).sqrt();
    v
}

/// The reference query direction for [`at_cosine`].
pub fn axis() -> Vec<f32> {
    at_cosine(1.0)
}

/// Always fails as if the model could not be pulled.
pub struct UnavailableEmbedder;

#[async_trait]
impl EmbeddingProvider for UnavailableEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::ModelUnavailable {
            model: "nomic-embed-text".into(),
            message: "pull failed".into(),
        })
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn model_id(&self) -> &str {
        "nomic-embed-text"
    }
}

/// Hash embeddings, except that any text containing `marker` fails.
pub struct FailingEmbedder {
    marker: &'static str,
}

impl FailingEmbedder {
    pub fn on(marker: &'static str) -> Self {
        Self { marker }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains(self.marker) {
            return Err(RagError::EmbeddingError {
                provider: "mock-failing".into(),
                message: format!("refused text containing {}", self.marker),
            });
        }
        Ok(hash_embedding(text, DIM))
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn model_id(&self) -> &str {
        "mock-failing"
    }
}

/// Sleeps before answering and records the peak number of calls in flight.
pub struct SlowEmbedder {
    delay: Duration,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub completed: AtomicUsize,
}

impl SlowEmbedder {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(hash_embedding(text, DIM))
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn model_id(&self) -> &str {
        "mock-slow"
    }
}

/// An in-memory store whose backend can be switched off.
pub struct FlakyStore {
    inner: InMemoryVectorStore,
    reachable: AtomicBool,
}

impl FlakyStore {
    pub fn new(reachable: bool) -> Arc<Self> {
        Arc::new(Self { inner: InMemoryVectorStore::new(), reachable: AtomicBool::new(reachable) })
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RagError::VectorStoreError {
                backend: "flaky".into(),
                message: "connection refused".into(),
            })
        }
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn initialize(&self) -> Result<()> {
        self.check()?;
        self.inner.initialize().await
    }

    async fn insert(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<()> {
        self.check()?;
        self.inner.insert(chunks, embeddings).await
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        self.check()?;
        self.inner.query(embedding, k, filter).await
    }

    async fn delete_by_source(&self, source_name: &str) -> Result<()> {
        self.check()?;
        self.inner.delete_by_source(source_name).await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.check()?;
        self.inner.stats().await
    }

    fn mode(&self) -> StoreMode {
        self.inner.mode()
    }

    fn backend(&self) -> &str {
        "flaky"
    }
}

/// An in-memory store whose queries can be made to never return.
pub struct HangingStore {
    inner: InMemoryVectorStore,
    hanging: AtomicBool,
}

impl HangingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { inner: InMemoryVectorStore::new(), hanging: AtomicBool::new(false) })
    }

    pub fn hang(&self) {
        self.hanging.store(true, Ordering::SeqCst);
    }

    async fn maybe_hang(&self) {
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl VectorStore for HangingStore {
    async fn initialize(&self) -> Result<()> {
        self.inner.initialize().await
    }

    async fn insert(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<()> {
        self.maybe_hang().await;
        self.inner.insert(chunks, embeddings).await
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        self.maybe_hang().await;
        self.inner.query(embedding, k, filter).await
    }

    async fn delete_by_source(&self, source_name: &str) -> Result<()> {
        self.maybe_hang().await;
        self.inner.delete_by_source(source_name).await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.maybe_hang().await;
        self.inner.stats().await
    }

    fn mode(&self) -> StoreMode {
        self.inner.mode()
    }

    fn backend(&self) -> &str {
        "hanging"
    }
}

/// `n` distinct five-character words.
pub fn words(n: usize) -> String {
    (0..n).map(|i| format!("w{i:04}")).collect::<Vec<_>>().join(" ")
}
