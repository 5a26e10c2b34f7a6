//! # ragpipe
//!
//! Retrieval-augmented question answering.
//!
//! A [`RagPipeline`] splits documents into overlapping chunks, embeds them,
//! and stores the vectors in a [`VectorIndex`]. A query is embedded, the
//! most similar chunks are retrieved, and a token-budgeted [`Prompt`] is
//! handed to a [`Generator`]. Its output must validate against the
//! [`OutputSchema`] before it is returned as a JSON object with the keys
//! `answer`, `poem` and `followup_question`.
//!
//! Embedders and generators sit behind traits, so the pipeline runs the same
//! way against the offline collaborators in [`mock`] and the HTTP ones in
//! `openai` (feature `openai`).
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragpipe::{Document, MockEmbeddingProvider, MockGenerator, RagConfig, RagPipeline};
//!
//! let config = RagConfig::builder().embedding_dimension(256).top_k(2).build()?;
//! let pipeline = RagPipeline::builder()
//!     .config(config)
//!     .embedding_provider(Arc::new(MockEmbeddingProvider::new(256)))
//!     .generator(Arc::new(MockGenerator::new()))
//!     .build()?;
//!
//! pipeline.ingest(&Document::new("cats", "Cats are mammals.")).await?;
//! println!("{}", pipeline.query("What are cats?").await?);
//! ```
//!
//! ## Feature flags
//!
//! | Feature  | Description |
//! |----------|-------------|
//! | `openai` | `OpenAIEmbeddingProvider` and `OpenAIGenerator` over HTTP |

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod index;
pub mod inmemory;
pub mod mock;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod retry;
pub mod schema;
pub mod similarity;
pub mod source;

#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker, split};
pub use config::{DEFAULT_SYSTEM_INSTRUCTIONS, RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, IndexEntry, RetrievedContext, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{ErrorKind, RagError, Result};
pub use generator::Generator;
pub use index::VectorIndex;
pub use inmemory::InMemoryVectorIndex;
pub use mock::{MockEmbeddingProvider, MockGenerator};
pub use pipeline::{PipelineState, QueryOutcome, RagPipeline, RagPipelineBuilder};
pub use prompt::{Prompt, PromptAssembler, PromptMessage, Role, estimate_tokens};
pub use retriever::Retriever;
pub use retry::{CallPolicy, RetryPolicy};
pub use schema::{OutputSchema, SchemaField, StructuredResponse};
pub use similarity::SimilarityMetric;
pub use source::load_documents;

#[cfg(feature = "openai")]
pub use openai::{OpenAIEmbeddingProvider, OpenAIGenerator};
