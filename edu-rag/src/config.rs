//! Configuration for the retrieval pipeline.
//!
//! Every tunable named here can be set in code through [`RagConfig::builder()`],
//! deserialized from any `serde` format, or overlaid from `EDU_RAG_*`
//! environment variables with [`RagConfig::from_env()`].

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Default significance threshold for relevance scores.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Window size in whitespace-delimited tokens.
    pub chunk_size: usize,
    /// Number of tokens each chunk repeats from the end of the previous window.
    pub chunk_overlap: usize,
    /// Chunks whose trimmed content is shorter than this many characters are dropped.
    pub min_chunk_chars: usize,
    /// Number of nearest neighbours requested from the vector store per query.
    pub top_k: usize,
    /// Relevance scores strictly above this value are significant.
    pub similarity_threshold: f32,
    /// Maximum number of chunks rendered into the assembled context.
    pub max_context_chunks: usize,
    /// Character budget for each rendered chunk before it is truncated.
    pub context_char_budget: usize,
    /// Maximum number of embedding calls in flight for one batch.
    pub embedding_concurrency: usize,
    /// Time budget, in milliseconds, for each embedding or vector-store call.
    pub operation_timeout_ms: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_chars: 50,
            top_k: 5,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_context_chunks: 3,
            context_char_budget: 300,
            embedding_concurrency: 4,
            operation_timeout_ms: 30_000,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// The per-call time budget as a [`Duration`].
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Build a configuration from the defaults overlaid with environment variables.
    ///
    /// Recognised variables: `EDU_RAG_CHUNK_SIZE`, `EDU_RAG_CHUNK_OVERLAP`,
    /// `EDU_RAG_MIN_CHUNK_CHARS`, `EDU_RAG_TOP_K`, `EDU_RAG_SIMILARITY_THRESHOLD`,
    /// `EDU_RAG_MAX_CONTEXT_CHUNKS`, `EDU_RAG_CONTEXT_CHAR_BUDGET`,
    /// `EDU_RAG_EMBEDDING_CONCURRENCY` and `EDU_RAG_OPERATION_TIMEOUT_MS`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a variable fails to parse or the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = RagConfigBuilder::default();
        let c = &mut builder.config;

        overlay(&lookup, "EDU_RAG_CHUNK_SIZE", &mut c.chunk_size)?;
        overlay(&lookup, "EDU_RAG_CHUNK_OVERLAP", &mut c.chunk_overlap)?;
        overlay(&lookup, "EDU_RAG_MIN_CHUNK_CHARS", &mut c.min_chunk_chars)?;
        overlay(&lookup, "EDU_RAG_TOP_K", &mut c.top_k)?;
        overlay(&lookup, "EDU_RAG_SIMILARITY_THRESHOLD", &mut c.similarity_threshold)?;
        overlay(&lookup, "EDU_RAG_MAX_CONTEXT_CHUNKS", &mut c.max_context_chunks)?;
        overlay(&lookup, "EDU_RAG_CONTEXT_CHAR_BUDGET", &mut c.context_char_budget)?;
        overlay(&lookup, "EDU_RAG_EMBEDDING_CONCURRENCY", &mut c.embedding_concurrency)?;
        overlay(&lookup, "EDU_RAG_OPERATION_TIMEOUT_MS", &mut c.operation_timeout_ms)?;

        builder.build()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.max_context_chunks == 0 {
            return Err(RagError::ConfigError(
                "max_context_chunks must be greater than zero".to_string(),
            ));
        }
        if self.embedding_concurrency == 0 {
            return Err(RagError::ConfigError(
                "embedding_concurrency must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RagError::ConfigError(format!(
                "similarity_threshold ({}) must be within [0, 1]",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

fn overlay<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> Result<()> {
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| RagError::ConfigError(format!("{key} has an invalid value: '{raw}'")))?;
    }
    Ok(())
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the window size in tokens.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in tokens.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the minimum character length a chunk must have to be kept.
    pub fn min_chunk_chars(mut self, chars: usize) -> Self {
        self.config.min_chunk_chars = chars;
        self
    }

    /// Set the number of nearest neighbours requested per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the significance threshold for relevance scores.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the maximum number of chunks included in the assembled context.
    pub fn max_context_chunks(mut self, n: usize) -> Self {
        self.config.max_context_chunks = n;
        self
    }

    /// Set the per-chunk character budget of the assembled context.
    pub fn context_char_budget(mut self, chars: usize) -> Self {
        self.config.context_char_budget = chars;
        self
    }

    /// Set the bounded fan-out for batch embedding.
    pub fn embedding_concurrency(mut self, n: usize) -> Self {
        self.config.embedding_concurrency = n;
        self
    }

    /// Set the time budget for each network-bound call.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k`, `max_context_chunks` or `embedding_concurrency` is zero
    /// - `similarity_threshold` is outside `[0, 1]`
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
