//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates document ingestion (chunk → embed → index)
//! and query execution. A query moves through a fixed sequence of states:
//!
//! ```text
//! IDLE → EMBEDDING_QUERY → RETRIEVING → ASSEMBLING_PROMPT → GENERATING → SERIALIZING → DONE
//! ```
//!
//! Any step can fail, which moves the run to `FAILED`, skips the remaining
//! steps and returns [`RagError::Pipeline`] naming the failing state.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragpipe::{MockEmbeddingProvider, MockGenerator, RagConfig, RagPipeline};
//!
//! let config = RagConfig::builder().embedding_dimension(256).build()?;
//! let pipeline = RagPipeline::builder()
//!     .config(config)
//!     .embedding_provider(Arc::new(MockEmbeddingProvider::new(256)))
//!     .generator(Arc::new(MockGenerator::new()))
//!     .build()?;
//!
//! pipeline.ingest(&document).await?;
//! let json = pipeline.query("What are cats?").await?;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Chunk, Document, RetrievedContext};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generator::Generator;
use crate::index::VectorIndex;
use crate::inmemory::InMemoryVectorIndex;
use crate::prompt::PromptAssembler;
use crate::retriever::Retriever;
use crate::retry::CallPolicy;
use crate::schema::{OutputSchema, StructuredResponse};

/// The states of a single query run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    /// Not started.
    Idle,
    /// Computing the query embedding.
    EmbeddingQuery,
    /// Searching the vector index.
    Retrieving,
    /// Building the prompt from context and query.
    AssemblingPrompt,
    /// Calling the generator and validating its output.
    Generating,
    /// Encoding the validated response as JSON.
    Serializing,
    /// Finished successfully.
    Done,
    /// Aborted by an error.
    Failed,
}

impl PipelineState {
    /// The state that follows this one on success, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::EmbeddingQuery),
            Self::EmbeddingQuery => Some(Self::Retrieving),
            Self::Retrieving => Some(Self::AssemblingPrompt),
            Self::AssemblingPrompt => Some(Self::Generating),
            Self::Generating => Some(Self::Serializing),
            Self::Serializing => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    /// Whether the run has ended.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The upper-case state name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::EmbeddingQuery => "EMBEDDING_QUERY",
            Self::Retrieving => "RETRIEVING",
            Self::AssemblingPrompt => "ASSEMBLING_PROMPT",
            Self::Generating => "GENERATING",
            Self::Serializing => "SERIALIZING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping for one query run.
struct QueryRun {
    state: PipelineState,
    visited: Vec<PipelineState>,
}

impl QueryRun {
    fn new() -> Self {
        Self { state: PipelineState::Idle, visited: vec![PipelineState::Idle] }
    }

    /// Move to the next state in sequence.
    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            debug!(from = %self.state, to = %next, "pipeline transition");
            self.state = next;
            self.visited.push(next);
        }
    }

    /// Record the outcome of the current step, failing the run on error.
    fn step<T>(&mut self, result: Result<T>) -> Result<T> {
        result.map_err(|e| {
            let state = self.state;
            error!(state = %state, kind = %e.kind(), error = %e, "query failed");
            self.state = PipelineState::Failed;
            self.visited.push(PipelineState::Failed);
            e.in_state(state)
        })
    }
}

/// Everything produced by a successful query.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// The validated response.
    pub response: StructuredResponse,
    /// `response` serialized as a JSON object.
    pub json: String,
    /// The chunks retrieved for the query, most similar first.
    pub context: RetrievedContext,
    /// Whether the prompt had to drop or cut context to fit the budget.
    pub prompt_truncated: bool,
    /// The states visited, from `IDLE` to `DONE`.
    pub states: Vec<PipelineState>,
}

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`]. The pipeline owns its
/// configuration and never changes it after construction.
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<dyn VectorIndex>,
    chunker: Arc<dyn Chunker>,
    generator: Arc<dyn Generator>,
    retriever: Retriever,
    assembler: PromptAssembler,
    schema: OutputSchema,
    call_policy: CallPolicy,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the vector index.
    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.vector_index
    }

    /// Return a reference to the retriever.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Return a reference to the output schema.
    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    /// Chunk and embed a document without touching the index.
    async fn embed_document(&self, document: &Document) -> Result<Vec<(Chunk, Vec<f32>)>> {
        let chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embedder = &self.embedding_provider;
        let embeddings = self
            .call_policy
            .run(embedder.name(), "embed_batch", || embedder.embed_batch(&texts))
            .await
            .inspect_err(|e| {
                error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
            })?;

        if embeddings.len() != chunks.len() {
            return Err(RagError::InvalidInput {
                provider: embedder.name().to_string(),
                message: format!(
                    "returned {} embeddings for {} chunks of document '{}'",
                    embeddings.len(),
                    chunks.len(),
                    document.id
                ),
            });
        }

        Ok(chunks.into_iter().zip(embeddings).collect())
    }

    /// Ingest a single document: chunk → embed → index.
    ///
    /// Any chunks previously indexed for the same document ID are replaced.
    /// Returns the chunks that were indexed.
    pub async fn ingest(&self, document: &Document) -> Result<Vec<Chunk>> {
        self.ingest_batch(std::slice::from_ref(document)).await
    }

    /// Ingest multiple documents.
    ///
    /// Documents are chunked and embedded concurrently (up to
    /// `ingest_concurrency` at a time). The previous chunks of every
    /// document are then replaced with the new ones in one atomic index
    /// update, so nothing changes if any document fails. When several
    /// documents share an ID the last one wins.
    pub async fn ingest_batch(&self, documents: &[Document]) -> Result<Vec<Chunk>> {
        let documents = last_by_id(documents);
        let embedded: Vec<Vec<(Chunk, Vec<f32>)>> = stream::iter(documents.iter().copied())
            .map(|document| self.embed_document(document))
            .buffered(self.config.ingest_concurrency)
            .try_collect()
            .await?;

        let document_ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        let entries: Vec<(Chunk, Vec<f32>)> = embedded.into_iter().flatten().collect();
        let chunks: Vec<Chunk> = entries.iter().map(|(chunk, _)| chunk.clone()).collect();
        self.vector_index.replace_documents(&document_ids, entries).await.inspect_err(|e| {
            error!(error = %e, "index update failed during ingestion");
        })?;

        info!(document_count = documents.len(), chunk_count = chunks.len(), "ingested documents");
        Ok(chunks)
    }

    /// Remove a document's chunks from the index. Returns how many were removed.
    pub async fn remove_document(&self, document_id: &str) -> Result<usize> {
        self.vector_index.delete_document(document_id).await
    }

    /// Retrieve context for `query` with the configured `top_k`, without generating.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievedContext> {
        self.retriever.retrieve_default(query).await
    }

    /// Answer `query` and return the response as a JSON object string with
    /// the keys `answer`, `poem` and `followup_question`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Pipeline`] wrapping the error of the failing step.
    pub async fn query(&self, query: &str) -> Result<String> {
        Ok(self.query_detailed(query).await?.json)
    }

    /// Answer `query`, returning the response together with the retrieved
    /// context and the visited states.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Pipeline`] wrapping the error of the failing step.
    /// No partial response is produced. Empty queries and queries too long for
    /// the prompt budget fail in `EMBEDDING_QUERY` before the embedder is
    /// called.
    pub async fn query_detailed(&self, query: &str) -> Result<QueryOutcome> {
        let mut run = QueryRun::new();

        run.advance();
        let query_vector = if query.trim().is_empty() {
            run.step(Err(RagError::InvalidInput {
                provider: "pipeline".to_string(),
                message: "query text must not be empty".to_string(),
            }))?
        } else {
            run.step(self.assembler.check_budget(&self.config.system_instructions, query))?;
            run.step(self.retriever.embed_query(query).await)?
        };

        run.advance();
        let results = run.step(self.retriever.search(&query_vector, self.config.top_k).await)?;
        let context = RetrievedContext::from(results);

        run.advance();
        let prompt = run.step(self.assembler.assemble(
            &self.config.system_instructions,
            &context,
            query,
        ))?;

        run.advance();
        let generator = &self.generator;
        let schema = &self.schema;
        let raw = run.step(
            self.call_policy
                .run(generator.name(), "generate", || generator.generate(&prompt, schema))
                .await,
        )?;
        let response: StructuredResponse = run.step(schema.validate(&raw))?;

        run.advance();
        let json = run.step(response.to_json())?;

        run.advance();
        info!(
            retrieved = context.len(),
            included = prompt.included_chunk_ids.len(),
            truncated = prompt.truncated,
            "query completed"
        );

        Ok(QueryOutcome {
            response,
            json,
            context,
            prompt_truncated: prompt.truncated,
            states: run.visited,
        })
    }
}

/// Keep the last document for each ID, in order of that last occurrence.
fn last_by_id(documents: &[Document]) -> Vec<&Document> {
    let mut seen = HashSet::new();
    let mut unique: Vec<&Document> =
        documents.iter().rev().filter(|d| seen.insert(d.id.as_str())).collect();
    unique.reverse();
    unique
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedding_provider` and `generator` are required. The vector
/// index defaults to an [`InMemoryVectorIndex`] and the chunker to a
/// [`RecursiveChunker`], both configured from `config`.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .generator(Arc::new(generator))
///     .vector_index(Arc::new(index))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn Generator>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generator.
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the vector index backend.
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set
    /// and that the components agree with the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing, the
    /// configuration is invalid, the embedder or index disagree with the
    /// configured dimension or similarity metric, or the system instructions
    /// alone use up `prompt_token_budget`.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;

        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| RagError::ConfigError("generator is required".to_string()))?;

        if embedding_provider.dimensions() != config.embedding_dimension {
            return Err(RagError::ConfigError(format!(
                "embedding_dimension is {} but embedder '{}' produces {}-dimensional vectors",
                config.embedding_dimension,
                embedding_provider.name(),
                embedding_provider.dimensions()
            )));
        }

        let vector_index = match self.vector_index {
            Some(index) => index,
            None => Arc::new(InMemoryVectorIndex::new(
                config.embedding_dimension,
                config.similarity_metric,
            )),
        };
        if vector_index.metric() != config.similarity_metric {
            return Err(RagError::ConfigError(format!(
                "vector index uses the {} metric but similarity_metric is {}",
                vector_index.metric(),
                config.similarity_metric
            )));
        }
        if vector_index.dimensions() != config.embedding_dimension {
            return Err(RagError::ConfigError(format!(
                "vector index expects {}-dimensional vectors but embedding_dimension is {}",
                vector_index.dimensions(),
                config.embedding_dimension
            )));
        }

        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)?),
        };

        let call_policy = config.call_policy();
        let retriever = Retriever::new(
            embedding_provider.clone(),
            vector_index.clone(),
            call_policy.clone(),
            config.top_k,
        )?
        .with_similarity_threshold(config.similarity_threshold);
        let assembler = PromptAssembler::new(config.prompt_token_budget)?;
        let instruction_tokens = assembler.instruction_tokens(&config.system_instructions);
        if instruction_tokens >= config.prompt_token_budget {
            return Err(RagError::ConfigError(format!(
                "prompt_token_budget ({}) leaves no room beyond the system instructions \
                 ({instruction_tokens} tokens)",
                config.prompt_token_budget
            )));
        }
        let schema = OutputSchema::structured_response()?;

        Ok(RagPipeline {
            config,
            embedding_provider,
            vector_index,
            chunker,
            generator,
            retriever,
            assembler,
            schema,
            call_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_follow_the_fixed_sequence() {
        let mut state = PipelineState::Idle;
        let mut names = vec![state.to_string()];
        while let Some(next) = state.next() {
            state = next;
            names.push(state.to_string());
        }
        assert_eq!(
            names,
            vec![
                "IDLE",
                "EMBEDDING_QUERY",
                "RETRIEVING",
                "ASSEMBLING_PROMPT",
                "GENERATING",
                "SERIALIZING",
                "DONE"
            ]
        );
        assert!(PipelineState::Failed.is_terminal());
        assert_eq!(PipelineState::Failed.next(), None);
    }

    #[test]
    fn failed_step_records_failed_state() {
        let mut run = QueryRun::new();
        run.advance();
        run.advance();
        let err = run
            .step::<()>(Err(RagError::IndexInconsistency("bad".into())))
            .unwrap_err();
        assert_eq!(err.failed_state(), Some(PipelineState::Retrieving));
        assert_eq!(run.state, PipelineState::Failed);
        assert_eq!(run.visited.last(), Some(&PipelineState::Failed));
    }

    #[test]
    fn state_serializes_in_upper_snake_case() {
        assert_eq!(
            serde_json::to_string(&PipelineState::AssemblingPrompt).unwrap(),
            "\"ASSEMBLING_PROMPT\""
        );
    }
}
