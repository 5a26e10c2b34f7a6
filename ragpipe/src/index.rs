//! Vector index trait for storing and searching chunk embeddings.

use async_trait::async_trait;

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::similarity::SimilarityMetric;

/// A store of (chunk, vector) entries with nearest-neighbour search.
///
/// An index has a fixed dimensionality and a fixed [`SimilarityMetric`]; both
/// are chosen at construction and apply to every insert and search.
/// Entries are never modified in place: inserting a chunk whose ID is already
/// present removes the old entry and appends the new one.
///
/// # Example
///
/// ```rust,ignore
/// use ragpipe::{InMemoryVectorIndex, SimilarityMetric, VectorIndex};
///
/// let index = InMemoryVectorIndex::new(384, SimilarityMetric::Cosine);
/// index.insert_batch(entries).await?;
/// let results = index.search(&query_embedding, 4).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The dimensionality every vector must have.
    fn dimensions(&self) -> usize;

    /// The metric used to score entries.
    fn metric(&self) -> SimilarityMetric;

    /// Insert one entry and return its identifier.
    ///
    /// Fails with [`RagError::IndexInconsistency`](crate::RagError::IndexInconsistency)
    /// if the vector has the wrong dimension or non-finite components.
    async fn insert(&self, chunk: Chunk, vector: Vec<f32>) -> Result<u64> {
        let ids = self.insert_batch(vec![(chunk, vector)]).await?;
        ids.into_iter().next().ok_or_else(|| {
            RagError::IndexInconsistency("insert_batch returned no identifier".to_string())
        })
    }

    /// Insert many entries atomically and return their identifiers in input
    /// order. Either every entry is inserted or none is, and concurrent
    /// searches never observe a partially inserted batch.
    async fn insert_batch(&self, entries: Vec<(Chunk, Vec<f32>)>) -> Result<Vec<u64>>;

    /// Return up to `k` entries most similar to `query`, highest score first.
    ///
    /// Equal scores are ordered by insertion, earliest first. Searching an
    /// empty index returns an empty `Vec`.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Remove entries by chunk ID. Returns how many were removed.
    async fn delete(&self, chunk_ids: &[&str]) -> Result<usize>;

    /// Remove every entry belonging to a document. Returns how many were removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    /// Remove every entry of `document_ids` and insert `entries`, as one
    /// atomic update. Every vector is validated first; on error the index is
    /// left unchanged. Returns the identifiers of the new entries in input
    /// order.
    async fn replace_documents(
        &self,
        document_ids: &[&str],
        entries: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<Vec<u64>>;

    /// Number of stored entries.
    async fn size(&self) -> usize;
}
