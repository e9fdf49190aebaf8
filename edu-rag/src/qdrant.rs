//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! # Example
//!
//! ```rust,ignore
//! use edu_rag::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::new("http://localhost:6334", "course_material", 768)?;
//! store.initialize().await?;
//! store.insert(&chunks, &embeddings).await?;
//! let results = store.query(&query_embedding, 5, None).await?;
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::document::{
    ChunkMetadata, DocumentChunk, MetadataFilter, RetrievalResult, StoreStats,
};
use crate::error::{RagError, Result};
use crate::vectorstore::{StoreMode, VectorStore};

const BACKEND: &str = "qdrant";

/// Page size used when scrolling the collection for subject aggregation.
const SCROLL_PAGE: u32 = 256;

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// All chunks live in one collection with cosine distance. Chunk ids are not
/// valid Qdrant point ids, so each point id is a UUIDv5 of the chunk id and
/// the chunk id itself is kept in the payload. Qdrant reports cosine
/// similarity; it is converted to distance `1 − similarity` before results
/// leave this store.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    dimensions: usize,
    initialized: AtomicBool,
}

impl QdrantVectorStore {
    /// Create a new Qdrant vector store connecting to the given URL.
    pub fn new(url: &str, collection: impl Into<String>, dimensions: usize) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self::from_client(client, collection, dimensions))
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant, collection: impl Into<String>, dimensions: usize) -> Self {
        Self { client, collection: collection.into(), dimensions, initialized: AtomicBool::new(false) }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::VectorStoreError { backend: BACKEND.to_string(), message: e.to_string() }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(RagError::NotInitialized { backend: BACKEND.to_string() })
        }
    }

    fn point_id(chunk_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
    }

    fn filter(filter: &MetadataFilter) -> Filter {
        let mut conditions = Vec::new();
        if let Some(subject) = &filter.subject {
            conditions.push(Condition::matches("subject", subject.clone()));
        }
        if let Some(grade) = filter.grade {
            conditions.push(Condition::matches("grade", i64::from(grade)));
        }
        if let Some(source_name) = &filter.source_name {
            conditions.push(Condition::matches("source_name", source_name.clone()));
        }
        Filter::must(conditions)
    }

    fn payload(chunk: &DocumentChunk) -> Result<Payload> {
        let m = &chunk.metadata;
        let mut value = json!({
            "chunk_id": chunk.id,
            "content": chunk.content,
            "source_name": m.source_name,
            "source_type": m.source_type,
            "chunk_index": m.chunk_index,
            "ingested_at": m.ingested_at.to_rfc3339(),
        });
        if let Some(subject) = &m.subject {
            value["subject"] = json!(subject);
        }
        if let Some(grade) = m.grade {
            value["grade"] = json!(grade);
        }
        Payload::try_from(value).map_err(Self::map_err)
    }

    /// Extract a string from a Qdrant payload value.
    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn extract_integer(value: &QdrantValue) -> Option<i64> {
        match &value.kind {
            Some(Kind::IntegerValue(n)) => Some(*n),
            Some(Kind::DoubleValue(n)) => Some(*n as i64),
            _ => None,
        }
    }

    fn metadata(payload: &HashMap<String, QdrantValue>) -> ChunkMetadata {
        let string = |key: &str| payload.get(key).and_then(Self::extract_string);
        let integer = |key: &str| payload.get(key).and_then(Self::extract_integer);

        ChunkMetadata {
            source_name: string("source_name").unwrap_or_default(),
            source_type: string("source_type").unwrap_or_default(),
            subject: string("subject"),
            grade: integer("grade").and_then(|g| u32::try_from(g).ok()),
            chunk_index: integer("chunk_index").and_then(|i| usize::try_from(i).ok()).unwrap_or(0),
            ingested_at: string("ingested_at")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn initialize(&self) -> Result<()> {
        let exists =
            self.client.collection_exists(&self.collection).await.map_err(Self::map_err)?;
        if exists {
            debug!(collection = %self.collection, "qdrant collection already exists, skipping creation");
        } else {
            self.client
                .create_collection(CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimensions as u64, Distance::Cosine),
                ))
                .await
                .map_err(Self::map_err)?;
            debug!(collection = %self.collection, dimensions = self.dimensions, "created qdrant collection");
        }
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn insert(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<()> {
        self.ensure_initialized()?;
        if chunks.len() != embeddings.len() {
            return Err(RagError::VectorStoreError {
                backend: BACKEND.to_string(),
                message: format!("{} chunks but {} embeddings", chunks.len(), embeddings.len()),
            });
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let points = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                Ok(PointStruct::new(
                    Self::point_id(&chunk.id),
                    embedding.clone(),
                    Self::payload(chunk)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, count = chunks.len(), "upserted chunks to qdrant");
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        self.ensure_initialized()?;
        let mut request = SearchPointsBuilder::new(&self.collection, embedding.to_vec(), k as u64)
            .with_payload(true);
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            request = request.filter(Self::filter(filter));
        }

        let response = self.client.search_points(request).await.map_err(Self::map_err)?;

        let results = response
            .result
            .into_iter()
            .map(|scored| RetrievalResult {
                content: scored
                    .payload
                    .get("content")
                    .and_then(Self::extract_string)
                    .unwrap_or_default(),
                metadata: Self::metadata(&scored.payload),
                distance: (1.0 - scored.score).max(0.0),
                relevance_score: 0.0,
            })
            .collect();

        Ok(results)
    }

    async fn delete_by_source(&self, source_name: &str) -> Result<()> {
        self.ensure_initialized()?;
        let filter = Self::filter(&MetadataFilter {
            source_name: Some(source_name.to_string()),
            ..MetadataFilter::default()
        });

        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(filter).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, source_name, "deleted source from qdrant");
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.ensure_initialized()?;
        let count = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(Self::map_err)?
            .result
            .map(|r| r.count as usize)
            .unwrap_or(0);

        let mut subjects = BTreeSet::new();
        let mut offset = None;
        loop {
            let mut request =
                ScrollPointsBuilder::new(&self.collection).limit(SCROLL_PAGE).with_payload(true);
            if let Some(offset) = offset.take() {
                request = request.offset(offset);
            }
            let page = self.client.scroll(request).await.map_err(Self::map_err)?;
            subjects.extend(
                page.result.iter().filter_map(|p| p.payload.get("subject").and_then(Self::extract_string)),
            );
            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(StoreStats { count, distinct_subjects: subjects.into_iter().collect() })
    }

    fn mode(&self) -> StoreMode {
        if self.initialized.load(Ordering::Acquire) { StoreMode::Live } else { StoreMode::Uninitialized }
    }

    fn backend(&self) -> &str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_stable_uuids() {
        let a = QdrantVectorStore::point_id("cells.pdf_chunk_0");
        assert_eq!(a, QdrantVectorStore::point_id("cells.pdf_chunk_0"));
        assert_ne!(a, QdrantVectorStore::point_id("cells.pdf_chunk_1"));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn payload_round_trips_metadata() {
        let chunk = DocumentChunk {
            id: "cells.pdf_chunk_4".into(),
            content: "Mitochondria produce ATP.".into(),
            metadata: ChunkMetadata {
                source_name: "cells.pdf".into(),
                source_type: "pdf".into(),
                subject: Some("biology".into()),
                grade: Some(10),
                chunk_index: 4,
                ingested_at: DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            },
        };
        let payload: HashMap<String, QdrantValue> =
            QdrantVectorStore::payload(&chunk).unwrap().into();
        assert_eq!(QdrantVectorStore::metadata(&payload), chunk.metadata);
    }
}
