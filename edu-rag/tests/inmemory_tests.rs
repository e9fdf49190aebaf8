//! Property tests for the in-memory and degraded vector stores.

use chrono::Utc;
use edu_rag::{
    ChunkMetadata, DegradedVectorStore, DocumentChunk, FallbackVectorStore, InMemoryVectorStore,
    MetadataFilter, RagError, StoreMode, VectorStore,
};
use proptest::prelude::*;
use std::sync::Arc;

const DIM: usize = 16;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-3 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

fn chunk(source: &str, index: usize, subject: Option<&str>) -> DocumentChunk {
    DocumentChunk {
        id: DocumentChunk::chunk_id(source, index),
        content: format!("{source} part {index}"),
        metadata: ChunkMetadata {
            source_name: source.to_string(),
            source_type: "txt".to_string(),
            subject: subject.map(str::to_string),
            grade: None,
            chunk_index: index,
            ingested_at: Utc::now(),
        },
    }
}

fn unit(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[i % DIM] = 1.0;
    v
}

async fn live_store() -> InMemoryVectorStore {
    let store = InMemoryVectorStore::new();
    store.initialize().await.unwrap();
    store
}

/// Results come back in ascending distance, at most `k` of them, with
/// distances inside `[0, 2]`.
mod prop_inmemory_query_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_ascending_and_bounded_by_k(
            embeddings in proptest::collection::vec(arb_normalized_embedding(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = live_store().await;
                let chunks: Vec<_> = (0..embeddings.len()).map(|i| chunk("doc", i, None)).collect();
                store.insert(&chunks, &embeddings).await.unwrap();
                store.query(&query, k, None).await.unwrap()
            });

            prop_assert!(results.len() <= k);
            prop_assert!(results.len() <= embeddings.len());
            for result in &results {
                prop_assert!((0.0..=2.0).contains(&result.distance));
            }
            for window in results.windows(2) {
                prop_assert!(
                    window[0].distance <= window[1].distance,
                    "results not in ascending order: {} > {}",
                    window[0].distance,
                    window[1].distance,
                );
            }
        }

        #[test]
        fn degraded_store_never_returns_results(
            query in arb_normalized_embedding(DIM),
            k in 0usize..50,
            subject in proptest::option::of("[a-z]{1,8}"),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let store = DegradedVectorStore;
            let filter = subject.map(MetadataFilter::subject);
            let (inserted, results) = rt.block_on(async {
                let inserted = store.insert(&[chunk("doc", 0, None)], &[query.clone()]).await;
                (inserted, store.query(&query, k, filter.as_ref()).await)
            });
            prop_assert!(inserted.is_ok());
            prop_assert!(results.unwrap().is_empty());
        }
    }
}

#[tokio::test]
async fn equal_distances_keep_insertion_order() {
    let store = live_store().await;
    let chunks: Vec<_> = (0..4).map(|i| chunk("ties", i, None)).collect();
    store.insert(&chunks, &vec![unit(0); 4]).await.unwrap();

    let results = store.query(&unit(0), 10, None).await.unwrap();
    let order: Vec<usize> = results.iter().map(|r| r.metadata.chunk_index).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn reinserting_an_id_replaces_the_entry() {
    let store = live_store().await;
    store.insert(&[chunk("a", 0, None)], &[unit(0)]).await.unwrap();
    store.insert(&[chunk("a", 0, Some("math"))], &[unit(1)]).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.distinct_subjects, vec!["math".to_string()]);
    let results = store.query(&unit(1), 1, None).await.unwrap();
    assert!(results[0].distance < 1e-6);
}

#[tokio::test]
async fn filter_and_delete_by_source() {
    let store = live_store().await;
    let chunks = vec![chunk("a", 0, Some("math")), chunk("a", 1, Some("math")), chunk("b", 0, Some("art"))];
    store.insert(&chunks, &[unit(0), unit(1), unit(2)]).await.unwrap();

    let math = store.query(&unit(0), 10, Some(&MetadataFilter::subject("math"))).await.unwrap();
    assert_eq!(math.len(), 2);
    assert!(math.iter().all(|r| r.metadata.subject.as_deref() == Some("math")));

    store.delete_by_source("a").await.unwrap();
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.distinct_subjects, vec!["art".to_string()]);
}

#[tokio::test]
async fn rejects_mismatched_embeddings() {
    let store = live_store().await;
    let err = store.insert(&[chunk("a", 0, None)], &[]).await.unwrap_err();
    assert!(matches!(err, RagError::VectorStoreError { .. }));

    store.insert(&[chunk("a", 0, None)], &[unit(0)]).await.unwrap();
    let err = store.insert(&[chunk("a", 1, None)], &[vec![1.0; DIM + 1]]).await.unwrap_err();
    assert!(matches!(err, RagError::VectorStoreError { .. }));
}

#[tokio::test]
async fn fallback_defers_to_live_store_before_initialize() {
    let store = FallbackVectorStore::new(Arc::new(InMemoryVectorStore::new()));
    assert_eq!(store.mode(), StoreMode::Uninitialized);
    let err = store.delete_by_source("a").await.unwrap_err();
    assert!(matches!(err, RagError::NotInitialized { .. }));

    store.initialize().await.unwrap();
    store.initialize().await.unwrap();
    assert_eq!(store.mode(), StoreMode::Live);
    store.delete_by_source("a").await.unwrap();
}

#[tokio::test]
async fn degraded_only_fallback_accepts_everything() {
    let store = FallbackVectorStore::degraded_only();
    assert_eq!(store.mode(), StoreMode::Degraded);
    store.insert(&[chunk("a", 0, None)], &[unit(0)]).await.unwrap();
    store.delete_by_source("a").await.unwrap();
    assert!(store.query(&unit(0), 3, None).await.unwrap().is_empty());
    assert_eq!(store.stats().await.unwrap().count, 0);
}
