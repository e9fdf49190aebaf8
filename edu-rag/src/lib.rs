//! # edu-rag
//!
//! Retrieval-augmented generation core for an educational chat assistant.
//!
//! Documents are split into overlapping token windows, embedded by a local
//! model runtime, and stored in a vector index. At chat time the query is
//! embedded, the nearest chunks are scored and filtered, and the best few are
//! rendered into a bounded context for the generation call.
//!
//! The vector index is best-effort: when it is unreachable the pipeline runs
//! in [`StoreMode::Degraded`], ingestion still succeeds and retrieval returns
//! an empty, low-confidence context.
//!
//! ## Feature flags
//!
//! | Feature | Adds |
//! |---------|------|
//! | `ollama` (default) | [`ollama::OllamaEmbeddingProvider`] |
//! | `qdrant` | [`qdrant::QdrantVectorStore`] |
//! | `full` | everything |
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use edu_rag::{IngestRequest, InMemoryVectorStore, RagConfig, RagPipeline};
//! use edu_rag::ollama::OllamaEmbeddingProvider;
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::from_env()?)
//!     .embedding_provider(Arc::new(OllamaEmbeddingProvider::from_env()?))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//! pipeline.initialize().await;
//!
//! pipeline.ingest(&IngestRequest::new(text, "cells.pdf", "pdf").with_subject("biology")).await?;
//! let context = pipeline.retrieve("What do mitochondria do?", Some("biology")).await;
//! let prompt = context.render_prompt();
//! ```

pub mod chunking;
pub mod config;
pub mod context;
pub mod degraded;
pub mod document;
pub mod embedding;
pub mod error;
pub mod fallback;
pub mod inmemory;
pub mod model_guard;
pub mod pipeline;
pub mod ranking;
pub mod vectorstore;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use chunking::{Chunker, TokenWindowChunker, normalize_text};
pub use config::{RagConfig, RagConfigBuilder};
pub use context::{AssembledContext, ContextAssembler, SourceAttribution};
pub use degraded::DegradedVectorStore;
pub use document::{
    ChunkMetadata, DocumentChunk, IngestRequest, MetadataFilter, RetrievalResult, SourceTags,
    StoreStats,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use fallback::FallbackVectorStore;
pub use inmemory::InMemoryVectorStore;
pub use model_guard::ModelGuard;
pub use pipeline::{IndexState, IngestReport, RagPipeline, RagPipelineBuilder};
pub use ranking::{RelevanceRanker, to_relevance};
pub use vectorstore::{StoreMode, VectorStore};
