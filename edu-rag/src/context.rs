//! Context assembly for the downstream generation call.

use serde::{Deserialize, Serialize};

use crate::config::RagConfig;
use crate::document::RetrievalResult;
use crate::ranking::RelevanceRanker;

/// Confidence reported when at least one significant chunk was used.
pub const CONFIDENCE_WITH_CONTEXT: f32 = 0.9;

/// Confidence reported when no significant chunk was found.
pub const CONFIDENCE_WITHOUT_CONTEXT: f32 = 0.7;

/// Marker appended to truncated chunk content.
pub const ELLIPSIS: &str = "...";

/// Which source a context passage came from, for UI attribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceAttribution {
    /// Source document name.
    pub source_name: String,
    /// Relevance as a whole percentage in `[0, 100]`.
    pub relevance_percent: u8,
}

/// The bounded context handed to the generation call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssembledContext {
    /// The user query this context was built for.
    pub query: String,
    /// `"[<source_name>] <content prefix>"` strings in ranked order.
    pub passages: Vec<String>,
    /// [`CONFIDENCE_WITH_CONTEXT`] or [`CONFIDENCE_WITHOUT_CONTEXT`].
    pub confidence: f32,
    /// One entry per passage, same order.
    pub sources: Vec<SourceAttribution>,
}

impl AssembledContext {
    /// A context with no passages, as returned when retrieval is unavailable.
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            passages: Vec::new(),
            confidence: CONFIDENCE_WITHOUT_CONTEXT,
            sources: Vec::new(),
        }
    }

    /// Whether any passage was selected.
    pub fn has_context(&self) -> bool {
        !self.passages.is_empty()
    }

    /// Render the prompt for the generation call.
    ///
    /// Without passages this is the bare query.
    pub fn render_prompt(&self) -> String {
        if self.passages.is_empty() {
            return self.query.clone();
        }
        format!(
            "Use the following excerpts from the course material to answer the question. \
             If they do not contain the answer, say so.\n\n{}\n\nQuestion: {}",
            self.passages.join("\n\n"),
            self.query
        )
    }
}

/// Selects significant results and renders them into labeled passages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextAssembler {
    ranker: RelevanceRanker,
    max_chunks: usize,
    char_budget: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

impl ContextAssembler {
    /// Create an assembler.
    ///
    /// # Arguments
    ///
    /// * `ranker`: decides which results are significant
    /// * `max_chunks`: maximum number of passages
    /// * `char_budget`: characters kept from each chunk before truncation
    pub fn new(ranker: RelevanceRanker, max_chunks: usize, char_budget: usize) -> Self {
        Self { ranker, max_chunks, char_budget }
    }

    /// Create an assembler from the pipeline configuration.
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(
            RelevanceRanker::new(config.similarity_threshold),
            config.max_context_chunks,
            config.context_char_budget,
        )
    }

    /// Build the context for `query` from ranked `results`.
    ///
    /// `results` must already carry relevance scores and be in ranked order.
    pub fn assemble(&self, query: &str, results: &[RetrievalResult]) -> AssembledContext {
        let used: Vec<&RetrievalResult> =
            self.ranker.significant(results).take(self.max_chunks).collect();

        if used.is_empty() {
            return AssembledContext::empty(query);
        }

        AssembledContext {
            query: query.to_string(),
            passages: used
                .iter()
                .map(|r| format!("[{}] {}", r.metadata.source_name, self.truncate(&r.content)))
                .collect(),
            confidence: CONFIDENCE_WITH_CONTEXT,
            sources: used
                .iter()
                .map(|r| SourceAttribution {
                    source_name: r.metadata.source_name.clone(),
                    relevance_percent: (r.relevance_score.clamp(0.0, 1.0) * 100.0).round() as u8,
                })
                .collect(),
        }
    }

    fn truncate(&self, content: &str) -> String {
        match content.char_indices().nth(self.char_budget) {
            Some((cut, _)) => format!("{}{ELLIPSIS}", &content[..cut]),
            None => content.to_string(),
        }
    }
}
