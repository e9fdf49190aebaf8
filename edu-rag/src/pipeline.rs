//! Retrieval pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates ingestion (chunk → embed → store) and
//! query-time retrieval (embed → search → rank → assemble) by composing a
//! [`Chunker`], an [`EmbeddingProvider`] and a [`VectorStore`].
//!
//! Ingestion fails closed: any error leaves the source
//! [`Unindexed`](IndexState::Unindexed) and is returned to the caller.
//! Retrieval fails open: errors are logged and answered with an empty,
//! low-confidence context so chat keeps working.
//!
//! # Example
//!
//! ```rust,ignore
//! use edu_rag::{IngestRequest, InMemoryVectorStore, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! pipeline.initialize().await;
//! pipeline.ingest(&IngestRequest::new(text, "cells.pdf", "pdf").with_subject("biology")).await?;
//! let context = pipeline.retrieve("what do mitochondria do?", Some("biology")).await;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, TokenWindowChunker};
use crate::config::RagConfig;
use crate::context::{AssembledContext, ContextAssembler};
use crate::document::{IngestRequest, MetadataFilter, RetrievalResult, StoreStats};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::fallback::FallbackVectorStore;
use crate::ranking::RelevanceRanker;
use crate::vectorstore::{StoreMode, VectorStore};

/// Shortest period accepted by [`RagPipeline::spawn_health_check`].
pub const MIN_HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Ingestion state of one source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// Not in the index (never ingested, deleted, ingested only while the
    /// store was degraded, or last ingestion failed after touching the store).
    Unindexed,
    /// Text is being split into chunks.
    Chunking,
    /// Chunks are being embedded.
    Embedding,
    /// All chunks were committed.
    Indexed,
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    /// The ingested source.
    pub source_name: String,
    /// Number of chunks committed.
    pub chunk_count: usize,
    /// Store mode at commit time. In degraded mode nothing was stored and
    /// the source keeps the state it had before.
    pub store_mode: StoreMode,
}

/// The retrieval pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`]. All methods take `&self`;
/// wrap the pipeline in an `Arc` to share it between request handlers.
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<FallbackVectorStore>,
    chunker: Arc<dyn Chunker>,
    ranker: RelevanceRanker,
    assembler: ContextAssembler,
    states: RwLock<HashMap<String, IndexState>>,
    source_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<FallbackVectorStore> {
        &self.vector_store
    }

    /// Current vector store mode.
    pub fn store_mode(&self) -> StoreMode {
        self.vector_store.mode()
    }

    /// Bring up the vector store, falling back to degraded mode if the
    /// backend is unreachable. Safe to call repeatedly.
    pub async fn initialize(&self) {
        // The fallback store turns every failure, timeouts included, into degraded mode.
        let _ = self.vector_store.initialize().await;
        info!(mode = %self.store_mode(), backend = self.vector_store.backend(), "pipeline initialized");
    }

    /// Retry initialization if the store is degraded. Returns whether the
    /// store is live afterwards.
    pub async fn reinitialize_if_degraded(&self) -> bool {
        if self.store_mode() == StoreMode::Degraded {
            debug!("retrying degraded vector store");
            let _ = self.vector_store.initialize().await;
        }
        self.store_mode() == StoreMode::Live
    }

    /// Spawn a task that calls [`reinitialize_if_degraded`](Self::reinitialize_if_degraded)
    /// every `interval`. The task ends once the pipeline is dropped.
    ///
    /// Intervals shorter than [`MIN_HEALTH_CHECK_INTERVAL`] are raised to it.
    pub fn spawn_health_check(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let interval = interval.max(MIN_HEALTH_CHECK_INTERVAL);
        let pipeline: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pipeline) = pipeline.upgrade() else { break };
                if pipeline.reinitialize_if_degraded().await {
                    debug!("vector store health check: live");
                }
            }
        })
    }

    /// Ingestion state of `source_name`.
    pub fn source_state(&self, source_name: &str) -> IndexState {
        self.states
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(source_name)
            .copied()
            .unwrap_or(IndexState::Unindexed)
    }

    fn set_state(&self, source_name: &str, state: IndexState) {
        let mut states = self.states.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if state == IndexState::Unindexed {
            states.remove(source_name);
        } else {
            states.insert(source_name.to_string(), state);
        }
    }

    fn source_lock(&self, source_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.source_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(source_name.to_string())
            .or_default()
            .clone()
    }

    /// Wait for exclusive access to `source_name`.
    async fn lock_source<'a>(&'a self, source_name: &'a str) -> SourceLock<'a> {
        let lock = self.source_lock(source_name);
        let guard = lock.lock_owned().await;
        SourceLock { pipeline: self, source_name, guard: Some(guard) }
    }

    /// Ingest one source: chunk → embed every chunk → replace the source's
    /// entries in the store.
    ///
    /// Embeddings are computed with bounded concurrency and committed in one
    /// insert only after all of them succeed. Ingestion and deletion of the
    /// same source are serialized. Dropping the returned future before it
    /// completes commits nothing.
    ///
    /// The recorded [`IndexState`] follows what the store holds:
    ///
    /// - a failure or cancellation before the old entries are deleted restores
    ///   the previous state, so an indexed source stays indexed with its old
    ///   chunks
    /// - a failure after the old entries were deleted leaves it `Unindexed`
    /// - a degraded-mode ingestion stores nothing and keeps the previous state
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyContent`] if the text yields no usable chunk
    /// - [`RagError::ModelUnavailable`] or [`RagError::EmbeddingError`] if embedding fails
    /// - [`RagError::Timeout`] if any embedding or store call exceeds the time budget
    /// - [`RagError::VectorStoreError`] or [`RagError::NotInitialized`] if the live store rejects the commit
    pub async fn ingest(&self, request: &IngestRequest) -> Result<IngestReport> {
        let source_name = request.source_name.as_str();
        let _lock = self.lock_source(source_name).await;

        let mut attempt = IngestAttempt {
            pipeline: self,
            source_name,
            previous: self.source_state(source_name),
            old_entries_deleted: false,
            committed: false,
        };
        match self.ingest_locked(request, &mut attempt).await {
            Ok(report) => {
                attempt.committed = true;
                let state = match report.store_mode {
                    StoreMode::Live => IndexState::Indexed,
                    _ if attempt.old_entries_deleted => IndexState::Unindexed,
                    _ => attempt.previous,
                };
                self.set_state(source_name, state);
                info!(
                    source_name,
                    chunk_count = report.chunk_count,
                    mode = %report.store_mode,
                    "ingested document"
                );
                Ok(report)
            }
            Err(e) => {
                error!(source_name, error = %e, "ingestion failed");
                Err(e)
            }
        }
    }

    async fn ingest_locked(
        &self,
        request: &IngestRequest,
        attempt: &mut IngestAttempt<'_>,
    ) -> Result<IngestReport> {
        let source_name = request.source_name.as_str();
        let timeout = self.config.operation_timeout();

        self.set_state(source_name, IndexState::Chunking);
        let chunks = self.chunker.chunk(
            &request.text,
            source_name,
            &request.source_type,
            &request.tags,
        )?;

        self.set_state(source_name, IndexState::Embedding);
        // Futures are built up front so the stream holds no borrowing closure.
        let calls: Vec<_> = chunks
            .iter()
            .map(|c| with_timeout("embedding", timeout, self.embedding_provider.embed(&c.content)))
            .collect();
        let embeddings: Vec<Vec<f32>> = stream::iter(calls)
            .buffered(self.config.embedding_concurrency)
            .try_collect()
            .await?;
        debug!(source_name, count = embeddings.len(), "embedded chunks");

        // Replace wholesale so ids from earlier chunking parameters do not linger.
        let deleting_live = self.store_mode() == StoreMode::Live;
        self.vector_store.delete_by_source(source_name).await?;
        attempt.old_entries_deleted = deleting_live;
        self.vector_store.insert(&chunks, &embeddings).await?;

        Ok(IngestReport {
            source_name: source_name.to_string(),
            chunk_count: chunks.len(),
            store_mode: self.store_mode(),
        })
    }

    /// Remove every chunk of `source_name` from the store.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotInitialized`] if the live store was never
    /// initialized, or the store's error if the delete fails.
    pub async fn delete_source(&self, source_name: &str) -> Result<()> {
        let _lock = self.lock_source(source_name).await;

        self.vector_store
            .delete_by_source(source_name)
            .await
            .inspect_err(|e| error!(source_name, error = %e, "delete failed"))?;

        self.set_state(source_name, IndexState::Unindexed);
        info!(source_name, "deleted document");
        Ok(())
    }

    /// Entry count and distinct subjects. `{0, []}` in degraded mode.
    ///
    /// # Errors
    ///
    /// Returns the store's error, e.g. [`RagError::NotInitialized`].
    pub async fn stats(&self) -> Result<StoreStats> {
        self.vector_store.stats().await
    }

    /// Ranked nearest neighbours of `query`, optionally filtered.
    ///
    /// Never fails: any error is logged and yields an empty list.
    pub async fn search(&self, query: &str, filter: Option<&MetadataFilter>) -> Vec<RetrievalResult> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        match self.try_search(query, filter).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }

    async fn try_search(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        let embedding = with_timeout(
            "query embedding",
            self.config.operation_timeout(),
            self.embedding_provider.embed(query),
        )
        .await?;
        let results = self.vector_store.query(&embedding, self.config.top_k, filter).await?;
        Ok(self.ranker.rank(results))
    }

    /// Build the generation context for a chat query, optionally restricted
    /// to one subject.
    ///
    /// Never fails: without usable results the context is empty and the
    /// confidence low.
    pub async fn retrieve(&self, query: &str, subject: Option<&str>) -> AssembledContext {
        let filter = subject.map(MetadataFilter::subject);
        let results = self.search(query, filter.as_ref()).await;
        let context = self.assembler.assemble(query, &results);
        debug!(
            candidates = results.len(),
            used = context.passages.len(),
            confidence = context.confidence,
            "assembled context"
        );
        context
    }
}

/// Settles the source state of an ingestion that did not commit, including
/// when the ingestion future is dropped part-way.
struct IngestAttempt<'a> {
    pipeline: &'a RagPipeline,
    source_name: &'a str,
    previous: IndexState,
    old_entries_deleted: bool,
    committed: bool,
}

impl Drop for IngestAttempt<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let state = if self.old_entries_deleted { IndexState::Unindexed } else { self.previous };
        self.pipeline.set_state(self.source_name, state);
    }
}

/// Exclusive access to one source. Forgets the source's mutex once no other
/// task holds or waits for it.
struct SourceLock<'a> {
    pipeline: &'a RagPipeline,
    source_name: &'a str,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SourceLock<'_> {
    fn drop(&mut self) {
        // Release our reference first so the count below only sees waiters.
        drop(self.guard.take());
        let mut locks =
            self.pipeline.source_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.get(self.source_name).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(self.source_name);
        }
    }
}

async fn with_timeout<T>(
    operation: &str,
    after: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(after, future)
        .await
        .map_err(|_| RagError::Timeout { operation: operation.to_string(), after })?
}

/// Builder for constructing a [`RagPipeline`].
///
/// Only the embedding provider is required. Without a vector store the
/// pipeline runs degraded; without a chunker it uses a
/// [`TokenWindowChunker`] sized from the configuration.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::from_env()?)
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(store))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration. Defaults to [`RagConfig::default()`].
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the live vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Override the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the embedding provider is missing
    /// or the configuration is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;

        let vector_store = match self.vector_store {
            Some(live) => FallbackVectorStore::new(live)
                .with_init_timeout(config.operation_timeout())
                .with_operation_timeout(config.operation_timeout()),
            None => FallbackVectorStore::degraded_only(),
        };
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(TokenWindowChunker::new(
                config.chunk_size,
                config.chunk_overlap,
                config.min_chunk_chars,
            ))
        });

        Ok(RagPipeline {
            ranker: RelevanceRanker::new(config.similarity_threshold),
            assembler: ContextAssembler::from_config(&config),
            config,
            embedding_provider,
            vector_store: Arc::new(vector_store),
            chunker,
            states: RwLock::new(HashMap::new()),
            source_locks: Mutex::new(HashMap::new()),
        })
    }
}
