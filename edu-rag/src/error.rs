//! Error types for the `edu-rag` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in retrieval operations.
///
/// A degraded vector store is deliberately absent from this list: it is an
/// observable [`StoreMode`](crate::vectorstore::StoreMode), not a failure.
#[derive(Debug, Error)]
pub enum RagError {
    /// The source had no usable text after normalization and chunking.
    #[error("no usable content to index for source '{source_name}'")]
    EmptyContent {
        /// The source that produced zero chunks.
        source_name: String,
    },

    /// The embedding model could not be made available locally.
    #[error("embedding model '{model}' is unavailable: {message}")]
    ModelUnavailable {
        /// The model identifier that failed acquisition.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// A live vector store was used before `initialize()` succeeded.
    #[error("vector store ({backend}) used before initialize()")]
    NotInitialized {
        /// The backend that was not initialized.
        backend: String,
    },

    /// A network-bound call exceeded its time budget.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The budget that was exceeded.
        after: Duration,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    /// Whether the error means the vector backend itself is unreachable or broken,
    /// as opposed to a caller mistake.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::VectorStoreError { .. } | Self::Timeout { .. })
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
