//! ragpipe CLI
//!
//! Answers questions over local text files.
//!
//! # Commands
//!
//! - `ask`: index documents and print a JSON answer to a question
//! - `chunk`: print the chunks a document set splits into, one JSON line each
//!
//! Exit code is 1 on error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use ragpipe::{
    Chunker, Document, EmbeddingProvider, Generator, MockEmbeddingProvider, MockGenerator,
    RagConfig, RagPipeline, RecursiveChunker, load_documents,
};
use serde_json::json;
use tracing::info;

mod telemetry;

/// Retrieval-augmented question answering over local documents
#[derive(Parser)]
#[command(name = "ragpipe")]
#[command(version)]
#[command(about = "Answer questions over local text files with structured JSON output")]
#[command(propagate_version = true)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index documents and answer a question
    Ask {
        /// Files or directories to load (.txt and .md)
        #[arg(long = "docs", required = true, num_args = 1..)]
        docs: Vec<PathBuf>,

        /// JSON configuration file; missing keys use defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Embedding and generation backend
        #[arg(long, value_enum, default_value_t = Provider::Mock)]
        provider: Provider,

        /// Override the configured number of chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,

        /// The question to answer
        question: String,
    },
    /// Print the chunks of each document as JSON lines
    Chunk {
        /// JSON configuration file; missing keys use defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// File or directory to load
        path: PathBuf,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Provider {
    /// Offline bag-of-words embeddings and an extractive generator
    Mock,
    /// OpenAI embeddings and chat completions (needs OPENAI_API_KEY)
    Openai,
}

fn load_config(path: Option<&Path>) -> Result<RagConfig> {
    match path {
        Some(path) => RagConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(RagConfig::default()),
    }
}

fn collaborators(
    provider: Provider,
    config: &RagConfig,
) -> Result<(Arc<dyn EmbeddingProvider>, Arc<dyn Generator>)> {
    match provider {
        Provider::Mock => Ok((
            Arc::new(MockEmbeddingProvider::new(config.embedding_dimension)),
            Arc::new(MockGenerator::new()),
        )),
        #[cfg(feature = "openai")]
        Provider::Openai => {
            use ragpipe::{OpenAIEmbeddingProvider, OpenAIGenerator};
            let embedder = OpenAIEmbeddingProvider::from_env()?
                .with_dimensions(config.embedding_dimension);
            Ok((Arc::new(embedder), Arc::new(OpenAIGenerator::from_env()?)))
        }
        #[cfg(not(feature = "openai"))]
        Provider::Openai => bail!("this build of ragpipe does not include the openai provider"),
    }
}

fn load_all(paths: &[PathBuf]) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for path in paths {
        documents.extend(
            load_documents(path)
                .with_context(|| format!("failed to load documents from {}", path.display()))?,
        );
    }
    Ok(documents)
}

async fn ask(
    docs: &[PathBuf],
    config: Option<&Path>,
    provider: Provider,
    top_k: Option<usize>,
    question: &str,
) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(k) = top_k {
        config.top_k = k;
    }

    let documents = load_all(docs)?;
    if documents.is_empty() {
        bail!("no .txt or .md documents found");
    }

    let (embedder, generator) = collaborators(provider, &config)?;
    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .generator(generator)
        .build()?;

    let chunks = pipeline.ingest_batch(&documents).await?;
    info!(documents = documents.len(), chunks = chunks.len(), "index ready");

    let response = pipeline.query(question).await?;
    println!("{response}");
    Ok(())
}

fn chunk(config: Option<&Path>, path: &Path) -> Result<()> {
    let config = load_config(config)?;
    let chunker = RecursiveChunker::new(config.chunk_size, config.chunk_overlap)?;

    for document in load_documents(path)? {
        for chunk in chunker.chunk(&document) {
            let line = json!({
                "id": chunk.id,
                "document_id": chunk.document_id,
                "start": chunk.start,
                "end": chunk.end,
                "chars": chunk.char_len(),
            });
            println!("{line}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json);

    match cli.command {
        Commands::Ask { docs, config, provider, top_k, question } => {
            ask(&docs, config.as_deref(), provider, top_k, &question).await
        }
        Commands::Chunk { config, path } => chunk(config.as_deref(), &path),
    }
}
