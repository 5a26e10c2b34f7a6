//! # RAG Basic Example
//!
//! Ingests a few documents, then answers questions about them with a
//! structured JSON response.
//!
//! Uses the bag-of-words `MockEmbeddingProvider` and the extractive
//! `MockGenerator`, so it runs with **zero API keys**.
//!
//! Run: `cargo run -p ragpipe --example rag_basic`

use std::sync::Arc;

use ragpipe::{Document, MockEmbeddingProvider, MockGenerator, RagConfig, RagPipeline};

const DIMENSIONS: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -- 1. Configure the pipeline ----------------------------------------
    // Small chunks keep the demo readable; top_k=2 passes the two most
    // similar chunks to the generator.
    let config = RagConfig::builder()
        .chunk_size(200)
        .chunk_overlap(40)
        .top_k(2)
        .embedding_dimension(DIMENSIONS)
        .build()?;

    // -- 2. Build the pipeline --------------------------------------------
    // The vector index and chunker default to an in-memory index and a
    // recursive chunker configured from `config`.
    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(MockEmbeddingProvider::new(DIMENSIONS)))
        .generator(Arc::new(MockGenerator::new()))
        .build()?;

    // -- 3. Ingest sample documents ---------------------------------------
    let documents = vec![
        Document::new(
            "rust",
            "Rust is a systems programming language focused on safety, speed, and \
             concurrency. It achieves memory safety without a garbage collector through \
             its ownership system.",
        )
        .with_metadata("topic", "rust"),
        Document::new(
            "python",
            "Python is a high-level, interpreted programming language known for its \
             readability and versatility. It is widely used in data science, web \
             development, and automation.",
        )
        .with_metadata("topic", "python"),
        Document::new(
            "rag",
            "Retrieval-augmented generation combines a retrieval system with a language \
             model. Documents are chunked, embedded, and stored in a vector index. At \
             query time the most relevant chunks are retrieved and given to the model \
             as context.",
        )
        .with_metadata("topic", "rag"),
    ];

    println!("Ingesting {} documents...", documents.len());
    let chunks = pipeline.ingest_batch(&documents).await?;
    println!("Indexed {} chunks.\n", chunks.len());

    // -- 4. Ask questions -------------------------------------------------
    let questions = [
        "How does Rust achieve memory safety?",
        "What is Python used for?",
        "What happens at query time in retrieval-augmented generation?",
    ];

    for question in questions {
        let outcome = pipeline.query_detailed(question).await?;
        println!("Q: {question}");
        for chunk in outcome.context.iter() {
            println!("   context: {} [{}..{}]", chunk.id, chunk.start, chunk.end);
        }
        println!("{}\n", serde_json::to_string_pretty(&outcome.response)?);
    }

    Ok(())
}
