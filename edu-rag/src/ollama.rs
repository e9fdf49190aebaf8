//! Embedding provider backed by a local Ollama model-serving runtime.
//!
//! This module is only available when the `ollama` feature is enabled.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::model_guard::ModelGuard;

/// The default Ollama endpoint.
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// The default embedding model.
const DEFAULT_MODEL: &str = "nomic-embed-text";

/// The dimensionality of `nomic-embed-text`.
const DEFAULT_DIMENSIONS: usize = 768;

/// Default number of embedding requests in flight for one batch.
const DEFAULT_CONCURRENCY: usize = 4;

const PROVIDER: &str = "Ollama";

/// An [`EmbeddingProvider`] backed by the Ollama HTTP API.
///
/// Before the first embedding call for its model, the provider lists local
/// models (`GET /api/tags`) and pulls the model (`POST /api/pull`) if it is
/// missing. The outcome is memoized in a [`ModelGuard`]; share one guard
/// across providers with [`with_guard`](Self::with_guard) to memoize per
/// process rather than per provider.
///
/// # Configuration
///
/// - `base_url` – defaults to `http://localhost:11434`, or `OLLAMA_HOST`.
/// - `model` – defaults to `nomic-embed-text`, or `EDU_RAG_EMBEDDING_MODEL`.
/// - `dimensions` – defaults to 768, or `EDU_RAG_EMBEDDING_DIMENSIONS`.
///
/// # Example
///
/// ```rust,ignore
/// use edu_rag::ollama::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::from_env()?;
/// let embedding = provider.embed("the water cycle").await?;
/// ```
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
    concurrency: usize,
    guard: Arc<ModelGuard>,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for `model` on the runtime at `base_url`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
            concurrency: DEFAULT_CONCURRENCY,
            guard: Arc::new(ModelGuard::new()),
        }
    }

    /// Create a provider with the default endpoint and model.
    pub fn local() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_DIMENSIONS)
    }

    /// Create a provider from `OLLAMA_HOST`, `EDU_RAG_EMBEDDING_MODEL` and
    /// `EDU_RAG_EMBEDDING_DIMENSIONS`, falling back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the dimensions variable is not a number.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let base_url = if base_url.starts_with("http") { base_url } else { format!("http://{base_url}") };
        let model = std::env::var("EDU_RAG_EMBEDDING_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        let dimensions = match std::env::var("EDU_RAG_EMBEDDING_DIMENSIONS") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                RagError::ConfigError(format!(
                    "EDU_RAG_EMBEDDING_DIMENSIONS has an invalid value: '{raw}'"
                ))
            })?,
            Err(_) => DEFAULT_DIMENSIONS,
        };
        Ok(Self::new(base_url, model, dimensions))
    }

    /// Set the maximum number of embedding requests in flight for one batch.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Share a model guard with other providers.
    pub fn with_guard(mut self, guard: Arc<ModelGuard>) -> Self {
        self.guard = guard;
        self
    }

    /// The runtime endpoint.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make sure the model is present locally, pulling it once if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelUnavailable`] if the runtime is unreachable or
    /// the pull does not succeed.
    pub async fn ensure_model(&self) -> Result<()> {
        self.guard.ensure(&self.model, || self.check_and_pull()).await
    }

    async fn check_and_pull(&self) -> Result<()> {
        let tags: TagsResponse = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.unavailable(format!("could not list local models: {e}")))?
            .json()
            .await
            .map_err(|e| self.unavailable(format!("failed to parse model list: {e}")))?;

        if model_listed(&tags.models, &self.model) {
            debug!(provider = PROVIDER, model = %self.model, "model already present");
            return Ok(());
        }

        info!(provider = PROVIDER, model = %self.model, "pulling embedding model");
        let pull: PullResponse = self
            .client
            .post(format!("{}/api/pull", self.base_url))
            .json(&PullRequest { model: &self.model, stream: false })
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.unavailable(format!("pull request failed: {e}")))?
            .json()
            .await
            .map_err(|e| self.unavailable(format!("failed to parse pull response: {e}")))?;

        if let Some(message) = pull.error {
            return Err(self.unavailable(message));
        }
        if pull.status.as_deref() != Some("success") {
            return Err(self.unavailable(format!("pull ended with status {:?}", pull.status)));
        }
        info!(provider = PROVIDER, model = %self.model, "embedding model pulled");
        Ok(())
    }

    fn unavailable(&self, message: String) -> RagError {
        error!(provider = PROVIDER, model = %self.model, %message, "model unavailable");
        RagError::ModelUnavailable { model: self.model.clone(), message }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest { model: &self.model, input: text })
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                embedding_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);

            error!(provider = PROVIDER, %status, "API error");
            return Err(embedding_error(format!("API returned {status}: {detail}")));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            embedding_error(format!("failed to parse response: {e}"))
        })?;

        let embedding = parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| embedding_error("API returned empty response".into()))?;
        if embedding.len() != self.dimensions {
            return Err(embedding_error(format!(
                "model '{}' returned {} dimensions, expected {}",
                self.model,
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(embedding)
    }
}

/// Whether `wanted` is among the local models, treating a missing tag as `:latest`.
fn model_listed(models: &[TagModel], wanted: &str) -> bool {
    let canonical =
        |name: &str| if name.contains(':') { name.to_string() } else { format!("{name}:latest") };
    let wanted = canonical(wanted);
    models.iter().any(|m| canonical(&m.name) == wanted)
}

fn embedding_error(message: String) -> RagError {
    RagError::EmbeddingError { provider: PROVIDER.into(), message }
}

// ── Ollama API request/response types ──────────────────────────────

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct PullResponse {
    status: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.ensure_model().await?;
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");
        self.embed_one(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_model().await?;

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            concurrency = self.concurrency,
            "embedding batch"
        );

        // `buffered` yields in input order regardless of completion order.
        let calls: Vec<_> = texts.iter().map(|text| self.embed_one(text)).collect();
        stream::iter(calls).buffered(self.concurrency).try_collect().await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<TagModel> {
        names.iter().map(|n| TagModel { name: (*n).to_string() }).collect()
    }

    #[test]
    fn untagged_model_matches_latest() {
        let models = tags(&["nomic-embed-text:latest", "llama3:8b"]);
        assert!(model_listed(&models, "nomic-embed-text"));
        assert!(model_listed(&models, "llama3:8b"));
        assert!(!model_listed(&models, "llama3"));
        assert!(!model_listed(&[], "nomic-embed-text"));
    }

    #[test]
    fn defaults_and_builders() {
        let provider = OllamaEmbeddingProvider::local().with_concurrency(0);
        assert_eq!(provider.base_url(), DEFAULT_BASE_URL);
        assert_eq!(provider.model_id(), DEFAULT_MODEL);
        assert_eq!(provider.dimensions(), DEFAULT_DIMENSIONS);
        assert_eq!(provider.concurrency, 1);

        let provider = OllamaEmbeddingProvider::new("http://gpu-box:11434/", "mxbai-embed-large", 1024);
        assert_eq!(provider.base_url(), "http://gpu-box:11434");
    }

    #[test]
    fn parses_api_payloads() {
        let tags: TagsResponse =
            serde_json::from_str(r#"{"models":[{"name":"nomic-embed-text:latest","size":1}]}"#)
                .unwrap();
        assert_eq!(tags.models.len(), 1);

        let pull: PullResponse = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert_eq!(pull.status.as_deref(), Some("success"));

        let embed: EmbedResponse =
            serde_json::from_str(r#"{"model":"m","embeddings":[[0.1,0.2]]}"#).unwrap();
        assert_eq!(embed.embeddings, vec![vec![0.1, 0.2]]);
    }

    #[tokio::test]
    async fn unreachable_runtime_is_model_unavailable() {
        // Port 9 (discard) is not an HTTP server.
        let provider = OllamaEmbeddingProvider::new("http://127.0.0.1:9", "nomic-embed-text", 768);
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, RagError::ModelUnavailable { model, .. } if model == "nomic-embed-text"));
    }
}
