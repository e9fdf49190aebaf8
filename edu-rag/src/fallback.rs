//! Live-or-degraded vector store switching.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::degraded::DegradedVectorStore;
use crate::document::{DocumentChunk, MetadataFilter, RetrievalResult, StoreStats};
use crate::error::{RagError, Result};
use crate::vectorstore::{StoreMode, VectorStore};

/// Wraps a live backend and swaps in [`DegradedVectorStore`] when it is
/// unreachable.
///
/// - `initialize()` tries the live backend; on failure the store becomes
///   degraded instead of returning an error. Calling it again while degraded
///   retries the backend and re-promotes on success.
/// - A backend failure during any later call demotes the store. Queries and
///   stats then answer from the degraded store; inserts and deletes still
///   return the error so ingestion can report it.
/// - An initialization that outlives the optional init timeout counts as a
///   failure. Likewise any later call that outlives the optional operation
///   timeout fails with [`RagError::Timeout`] and demotes the store.
/// - Before the first `initialize()`, calls go to the live backend, which
///   rejects them with [`RagError::NotInitialized`].
pub struct FallbackVectorStore {
    live: Arc<dyn VectorStore>,
    degraded: Arc<dyn VectorStore>,
    active: RwLock<Arc<dyn VectorStore>>,
    init_timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
}

impl FallbackVectorStore {
    /// Wrap `live`.
    pub fn new(live: Arc<dyn VectorStore>) -> Self {
        Self {
            active: RwLock::new(live.clone()),
            live,
            degraded: Arc::new(DegradedVectorStore),
            init_timeout: None,
            operation_timeout: None,
        }
    }

    /// Bound how long `initialize()` waits for the live backend.
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = Some(timeout);
        self
    }

    /// Bound how long each insert, query, delete or stats call may take.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Start degraded, with no live backend at all.
    pub fn degraded_only() -> Self {
        let degraded: Arc<dyn VectorStore> = Arc::new(DegradedVectorStore);
        Self {
            live: degraded.clone(),
            degraded: degraded.clone(),
            active: RwLock::new(degraded),
            init_timeout: None,
            operation_timeout: None,
        }
    }

    fn active(&self) -> Arc<dyn VectorStore> {
        self.active.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    fn set_active(&self, store: Arc<dyn VectorStore>) {
        *self.active.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = store;
    }

    fn demote(&self, error: &RagError) {
        if error.is_backend_failure() && self.mode() != StoreMode::Degraded {
            warn!(backend = self.live.backend(), error = %error, "vector store degraded");
            self.set_active(self.degraded.clone());
        }
    }
}

async fn bounded<T>(
    operation: &str,
    limit: Option<Duration>,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(after) => tokio::time::timeout(after, future)
            .await
            .unwrap_or_else(|_| Err(RagError::Timeout { operation: operation.to_string(), after })),
        None => future.await,
    }
}

#[async_trait]
impl VectorStore for FallbackVectorStore {
    async fn initialize(&self) -> Result<()> {
        let previous = self.mode();
        let attempt =
            bounded("vector store initialize", self.init_timeout, self.live.initialize()).await;
        match attempt {
            Ok(()) => {
                if self.live.mode() == StoreMode::Live && previous != StoreMode::Live {
                    info!(backend = self.live.backend(), "vector store live");
                }
                self.set_active(self.live.clone());
            }
            Err(e) => {
                warn!(backend = self.live.backend(), error = %e, "vector store unavailable, running degraded");
                self.set_active(self.degraded.clone());
            }
        }
        Ok(())
    }

    async fn insert(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<()> {
        let store = self.active();
        let limit = self.operation_timeout;
        let result = bounded("vector store insert", limit, store.insert(chunks, embeddings)).await;
        if let Err(e) = &result {
            self.demote(e);
        }
        result
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        let store = self.active();
        let limit = self.operation_timeout;
        match bounded("vector store query", limit, store.query(embedding, k, filter)).await {
            Err(e) if e.is_backend_failure() => {
                self.demote(&e);
                Ok(Vec::new())
            }
            other => other,
        }
    }

    async fn delete_by_source(&self, source_name: &str) -> Result<()> {
        let store = self.active();
        let limit = self.operation_timeout;
        let result = bounded("vector store delete", limit, store.delete_by_source(source_name)).await;
        if let Err(e) = &result {
            self.demote(e);
        }
        result
    }

    async fn stats(&self) -> Result<StoreStats> {
        let store = self.active();
        match bounded("vector store stats", self.operation_timeout, store.stats()).await {
            Err(e) if e.is_backend_failure() => {
                self.demote(&e);
                Ok(StoreStats::default())
            }
            other => other,
        }
    }

    fn mode(&self) -> StoreMode {
        self.active().mode()
    }

    fn backend(&self) -> &str {
        self.live.backend()
    }
}
