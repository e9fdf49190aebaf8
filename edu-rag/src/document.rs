//! Data types for chunks, retrieval results, and store statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata carried by every [`DocumentChunk`] and stored alongside its vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    /// Name of the source document (file name or title).
    pub source_name: String,
    /// Kind of source, e.g. `pdf`, `docx`, `txt`.
    pub source_type: String,
    /// Optional school subject the document belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Optional grade level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<u32>,
    /// Dense 0-based position of this chunk among the kept chunks of its source.
    pub chunk_index: usize,
    /// When the source was ingested.
    pub ingested_at: DateTime<Utc>,
}

/// A unit of retrievable text produced by a [`Chunker`](crate::chunking::Chunker).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    /// `"<source_name>_chunk_<n>"`.
    pub id: String,
    /// Whitespace-normalized chunk text.
    pub content: String,
    /// Source and position metadata.
    pub metadata: ChunkMetadata,
}

impl DocumentChunk {
    /// Build the deterministic chunk id for a source and chunk index.
    pub fn chunk_id(source_name: &str, chunk_index: usize) -> String {
        format!("{source_name}_chunk_{chunk_index}")
    }
}

/// Optional topical metadata supplied with a document at ingestion time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceTags {
    /// School subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Grade level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<u32>,
}

/// Everything the document-ingestion boundary hands to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestRequest {
    /// Raw extracted text.
    pub text: String,
    /// Name of the source document.
    pub source_name: String,
    /// Kind of source.
    pub source_type: String,
    /// Optional subject and grade.
    #[serde(default)]
    pub tags: SourceTags,
}

impl IngestRequest {
    /// Create a request without subject or grade tags.
    pub fn new(
        text: impl Into<String>,
        source_name: impl Into<String>,
        source_type: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            source_name: source_name.into(),
            source_type: source_type.into(),
            tags: SourceTags::default(),
        }
    }

    /// Attach a subject tag.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.tags.subject = Some(subject.into());
        self
    }

    /// Attach a grade tag.
    pub fn with_grade(mut self, grade: u32) -> Self {
        self.tags.grade = Some(grade);
        self
    }
}

/// Equality filter over chunk metadata. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataFilter {
    /// Match chunks with this subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Match chunks with this grade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<u32>,
    /// Match chunks from this source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
}

impl MetadataFilter {
    /// A filter on subject only.
    pub fn subject(subject: impl Into<String>) -> Self {
        Self { subject: Some(subject.into()), ..Self::default() }
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.subject.is_none() && self.grade.is_none() && self.source_name.is_none()
    }

    /// Whether `metadata` satisfies every set field.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.subject.as_ref().is_none_or(|s| metadata.subject.as_ref() == Some(s))
            && self.grade.is_none_or(|g| metadata.grade == Some(g))
            && self.source_name.as_ref().is_none_or(|s| &metadata.source_name == s)
    }
}

/// One nearest-neighbour hit, computed per query and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// The stored chunk text.
    pub content: String,
    /// The stored chunk metadata.
    pub metadata: ChunkMetadata,
    /// Distance to the query, normalized so 0 is identical and 1 or more is unrelated.
    pub distance: f32,
    /// Relevance in `[0, 1]`, filled in by the [`RelevanceRanker`](crate::ranking::RelevanceRanker).
    pub relevance_score: f32,
}

/// Aggregate counts reported by a vector store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored entries.
    pub count: usize,
    /// Sorted, de-duplicated subjects across all stored entries.
    pub distinct_subjects: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(subject: Option<&str>, grade: Option<u32>) -> ChunkMetadata {
        ChunkMetadata {
            source_name: "algebra.pdf".to_string(),
            source_type: "pdf".to_string(),
            subject: subject.map(str::to_string),
            grade,
            chunk_index: 0,
            ingested_at: Utc::now(),
        }
    }

    #[test]
    fn chunk_id_format() {
        assert_eq!(DocumentChunk::chunk_id("notes.txt", 3), "notes.txt_chunk_3");
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = MetadataFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&metadata(None, None)));
    }

    #[test]
    fn filter_requires_every_set_field() {
        let filter = MetadataFilter { subject: Some("math".into()), grade: Some(7), source_name: None };
        assert!(filter.matches(&metadata(Some("math"), Some(7))));
        assert!(!filter.matches(&metadata(Some("math"), Some(8))));
        assert!(!filter.matches(&metadata(None, Some(7))));
    }
}
