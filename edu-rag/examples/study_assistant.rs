//! # Study Assistant Example
//!
//! Ingests a short lesson, then answers a question with retrieved context.
//!
//! Needs a local Ollama runtime (`OLLAMA_HOST`, default `localhost:11434`);
//! the embedding model is pulled on first use. With the `qdrant` feature and
//! `QDRANT_URL` set, chunks go to Qdrant; otherwise they stay in memory. If
//! the vector store is unreachable the assistant keeps answering without
//! context.
//!
//! Run: `RUST_LOG=edu_rag=debug cargo run -p edu-rag --example study_assistant`

use std::sync::Arc;
use std::time::Duration;

use edu_rag::ollama::OllamaEmbeddingProvider;
use edu_rag::{EmbeddingProvider, IngestRequest, RagConfig, RagPipeline, VectorStore};
use tracing_subscriber::EnvFilter;

const LESSON: &str = r#"
Photosynthesis is the process by which green plants, algae and some bacteria
convert light energy into chemical energy. It takes place mainly in the
chloroplasts of leaf cells, which contain the green pigment chlorophyll.

During the light-dependent reactions, chlorophyll absorbs light and water
molecules are split, releasing oxygen as a by-product. The energy captured is
stored temporarily in ATP and NADPH.

In the Calvin cycle, which does not need light directly, the plant uses ATP and
NADPH to fix carbon dioxide from the air into glucose. Glucose is then used for
respiration or stored as starch.
"#;

#[cfg(feature = "qdrant")]
fn vector_store(dimensions: usize) -> anyhow::Result<Arc<dyn VectorStore>> {
    match std::env::var("QDRANT_URL") {
        Ok(url) => Ok(Arc::new(edu_rag::qdrant::QdrantVectorStore::new(
            &url,
            "course_material",
            dimensions,
        )?)),
        Err(_) => Ok(Arc::new(edu_rag::InMemoryVectorStore::new())),
    }
}

#[cfg(not(feature = "qdrant"))]
fn vector_store(_dimensions: usize) -> anyhow::Result<Arc<dyn VectorStore>> {
    Ok(Arc::new(edu_rag::InMemoryVectorStore::new()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // -- 1. Configuration from EDU_RAG_* variables, with small windows ----
    let config = RagConfig::from_env()?;
    let config = RagConfig { chunk_size: 60, chunk_overlap: 15, ..config };
    config.validate()?;

    // -- 2. Components ----------------------------------------------------
    let embedder =
        OllamaEmbeddingProvider::from_env()?.with_concurrency(config.embedding_concurrency);
    let store = vector_store(embedder.dimensions())?;

    let pipeline = Arc::new(
        RagPipeline::builder()
            .config(config)
            .embedding_provider(Arc::new(embedder))
            .vector_store(store)
            .build()?,
    );
    pipeline.initialize().await;
    let _health = pipeline.spawn_health_check(Duration::from_secs(30));

    // -- 3. Ingest ----------------------------------------------------------
    let request = IngestRequest::new(LESSON, "photosynthesis.md", "markdown")
        .with_subject("biology")
        .with_grade(8);
    let report = pipeline.ingest(&request).await?;
    println!("Indexed {} chunks ({} store)", report.chunk_count, report.store_mode);

    let stats = pipeline.stats().await?;
    println!("Store holds {} chunks, subjects: {:?}", stats.count, stats.distinct_subjects);

    // -- 4. Retrieve --------------------------------------------------------
    let question = "Where in the cell does photosynthesis happen?";
    let context = pipeline.retrieve(question, Some("biology")).await;
    println!("\nConfidence: {:.1}", context.confidence);
    for source in &context.sources {
        println!("  {} ({}%)", source.source_name, source.relevance_percent);
    }
    println!("\n--- prompt ---\n{}", context.render_prompt());

    // -- 5. Clean up ---------------------------------------------------------
    pipeline.delete_source("photosynthesis.md").await?;
    Ok(())
}
