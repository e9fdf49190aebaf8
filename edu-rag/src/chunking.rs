//! Document chunking.
//!
//! This module provides the [`Chunker`] trait, the [`normalize_text`] pass every
//! chunker runs first, and [`TokenWindowChunker`], which splits normalized text
//! into overlapping windows of whitespace-delimited tokens.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;

use crate::document::{ChunkMetadata, DocumentChunk, SourceTags};
use crate::error::{RagError, Result};

static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("valid regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[^\S\n]*\n)+").expect("valid regex"));

/// Collapse runs of horizontal whitespace to one space, runs of blank lines to
/// one blank line, and trim the ends.
///
/// Idempotent: `normalize_text(&normalize_text(s)) == normalize_text(s)`.
pub fn normalize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = text.split('\n').map(str::trim).collect::<Vec<_>>().join("\n");
    BLANK_LINES.replace_all(&text, "\n\n").trim().to_string()
}

/// A strategy for splitting a source's text into [`DocumentChunk`]s.
///
/// Chunks come back in emission order with dense `chunk_index` values and no
/// embeddings; the pipeline attaches vectors afterwards.
pub trait Chunker: Send + Sync {
    /// Split `text` into chunks tagged with the given source metadata.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyContent`] when no usable chunk remains.
    fn chunk(
        &self,
        text: &str,
        source_name: &str,
        source_type: &str,
        tags: &SourceTags,
    ) -> Result<Vec<DocumentChunk>>;
}

/// Splits text into overlapping windows of whitespace-delimited tokens.
///
/// For `N` tokens, window `W` and overlap `V`, candidate `k` covers tokens
/// `[max(0, k·W − V), min(N, k·W + W))`, giving `ceil(N / W)` candidates.
/// Candidates shorter than `min_chars` characters after trimming are dropped,
/// and the survivors are numbered densely from zero.
///
/// Working on tokens rather than bytes keeps multi-byte characters intact.
///
/// # Example
///
/// ```rust,ignore
/// use edu_rag::{Chunker, SourceTags, TokenWindowChunker};
///
/// let chunker = TokenWindowChunker::new(1000, 200, 50);
/// let chunks = chunker.chunk(&text, "biology.pdf", "pdf", &SourceTags::default())?;
/// ```
#[derive(Debug, Clone)]
pub struct TokenWindowChunker {
    window: usize,
    overlap: usize,
    min_chars: usize,
}

impl TokenWindowChunker {
    /// Create a new `TokenWindowChunker`.
    ///
    /// # Arguments
    ///
    /// * `window`: tokens per window step (`W`)
    /// * `overlap`: tokens repeated from the previous window (`V`, less than `W`)
    /// * `min_chars`: minimum trimmed character length of a kept chunk
    pub fn new(window: usize, overlap: usize, min_chars: usize) -> Self {
        Self { window: window.max(1), overlap: overlap.min(window.saturating_sub(1)), min_chars }
    }

    /// Token spans `[start, end)` of every candidate window for `token_count` tokens.
    pub fn windows(&self, token_count: usize) -> Vec<(usize, usize)> {
        let candidates = token_count.div_ceil(self.window);
        (0..candidates)
            .map(|k| {
                let base = k * self.window;
                (base.saturating_sub(self.overlap), (base + self.window).min(token_count))
            })
            .collect()
    }
}

impl Chunker for TokenWindowChunker {
    fn chunk(
        &self,
        text: &str,
        source_name: &str,
        source_type: &str,
        tags: &SourceTags,
    ) -> Result<Vec<DocumentChunk>> {
        let normalized = normalize_text(text);
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(RagError::EmptyContent { source_name: source_name.to_string() });
        }

        let ingested_at = Utc::now();
        let mut chunks = Vec::new();

        for (start, end) in self.windows(tokens.len()) {
            let content = tokens[start..end].join(" ");
            if content.trim().chars().count() < self.min_chars {
                continue;
            }

            let chunk_index = chunks.len();
            chunks.push(DocumentChunk {
                id: DocumentChunk::chunk_id(source_name, chunk_index),
                content,
                metadata: ChunkMetadata {
                    source_name: source_name.to_string(),
                    source_type: source_type.to_string(),
                    subject: tags.subject.clone(),
                    grade: tags.grade,
                    chunk_index,
                    ingested_at,
                },
            });
        }

        if chunks.is_empty() {
            return Err(RagError::EmptyContent { source_name: source_name.to_string() });
        }
        Ok(chunks)
    }
}
