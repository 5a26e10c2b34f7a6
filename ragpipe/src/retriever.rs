//! Query-time retrieval: embed the query, search the index, rank the chunks.

use std::sync::Arc;

use tracing::debug;

use crate::document::{RetrievedContext, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::retry::CallPolicy;

/// Retrieves the chunks most relevant to a query.
///
/// The query embedding is computed once per call through the configured
/// [`CallPolicy`], so embedder timeouts and retries behave the same as for
/// every other collaborator call.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    call_policy: CallPolicy,
    top_k: usize,
    similarity_threshold: Option<f32>,
}

impl Retriever {
    /// Create a retriever returning `top_k` chunks by default.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `top_k == 0` or the embedder and
    /// index disagree on dimensionality.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        call_policy: CallPolicy,
        top_k: usize,
    ) -> Result<Self> {
        check_k(top_k)?;
        if embedder.dimensions() != index.dimensions() {
            return Err(RagError::ConfigError(format!(
                "embedder '{}' produces {}-dimensional vectors but the index expects {}",
                embedder.name(),
                embedder.dimensions(),
                index.dimensions()
            )));
        }
        Ok(Self { embedder, index, call_policy, top_k, similarity_threshold: None })
    }

    /// Drop results scoring below `threshold`.
    pub fn with_similarity_threshold(mut self, threshold: Option<f32>) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// The default number of chunks returned.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Embed query text through the call policy.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedder = &self.embedder;
        let vector = self
            .call_policy
            .run(embedder.name(), "embed_query", || embedder.embed(query))
            .await?;
        if vector.len() != self.index.dimensions() {
            return Err(RagError::IndexInconsistency(format!(
                "query embedding has dimension {} but the index expects {}",
                vector.len(),
                self.index.dimensions()
            )));
        }
        Ok(vector)
    }

    /// Search the index with an already embedded query, applying the
    /// similarity threshold if one is set.
    pub async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        check_k(k)?;
        let mut results = self.index.search(query_vector, k).await?;
        if let Some(threshold) = self.similarity_threshold {
            results.retain(|r| r.score >= threshold);
        }
        debug!(k, result_count = results.len(), "index searched");
        Ok(results)
    }

    /// Return the `k` chunks most similar to `query`, most similar first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `k == 0`, or the embedder's error
    /// if the query cannot be embedded.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievedContext> {
        check_k(k)?;
        let vector = self.embed_query(query).await?;
        Ok(self.search(&vector, k).await?.into())
    }

    /// [`retrieve`](Retriever::retrieve) with the default `top_k`.
    pub async fn retrieve_default(&self, query: &str) -> Result<RetrievedContext> {
        self.retrieve(query, self.top_k).await
    }
}

fn check_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
    }
    Ok(())
}
