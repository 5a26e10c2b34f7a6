//! In-memory vector index using an exact brute-force scan.
//!
//! [`InMemoryVectorIndex`] keeps its entries in insertion order behind a
//! `tokio::sync::RwLock`. Searches take the read lock and run concurrently
//! with each other; inserts and deletes take the write lock, so a search that
//! overlaps a batch insert waits for it and then sees the whole batch.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Chunk, IndexEntry, SearchResult};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::similarity::SimilarityMetric;

/// An in-memory vector index scored with a configurable [`SimilarityMetric`].
///
/// Each search scans every entry (O(n·D)). Suitable for development,
/// testing, and small corpora.
///
/// # Example
///
/// ```rust,ignore
/// use ragpipe::{InMemoryVectorIndex, SimilarityMetric, VectorIndex};
///
/// let index = InMemoryVectorIndex::new(384, SimilarityMetric::Cosine);
/// index.insert(chunk, vector).await?;
/// ```
#[derive(Debug)]
pub struct InMemoryVectorIndex {
    dimensions: usize,
    metric: SimilarityMetric,
    state: RwLock<IndexState>,
}

#[derive(Debug, Default)]
struct IndexState {
    entries: Vec<IndexEntry>,
    next_id: u64,
}

impl IndexState {
    /// Drop the given documents and every entry whose chunk ID is being
    /// reinserted, then append `entries`. Within `entries` the last entry for
    /// a chunk ID wins.
    fn replace(&mut self, document_ids: &[&str], entries: Vec<(Chunk, Vec<f32>)>) -> Vec<u64> {
        let mut seen = HashSet::new();
        let mut keep: Vec<bool> =
            entries.iter().rev().map(|(chunk, _)| seen.insert(chunk.id.clone())).collect();
        keep.reverse();

        let replaced: HashSet<&str> = document_ids.iter().copied().collect();
        self.entries.retain(|e| {
            !seen.contains(&e.chunk.id) && !replaced.contains(e.chunk.document_id.as_str())
        });

        let mut ids = Vec::with_capacity(entries.len());
        for ((chunk, vector), keep) in entries.into_iter().zip(keep) {
            let id = self.next_id;
            self.next_id += 1;
            ids.push(id);
            if keep {
                self.entries.push(IndexEntry { id, chunk, vector });
            }
        }
        ids
    }
}

impl InMemoryVectorIndex {
    /// Create a new empty index.
    pub fn new(dimensions: usize, metric: SimilarityMetric) -> Self {
        Self { dimensions, metric, state: RwLock::new(IndexState::default()) }
    }

    /// A copy of every entry, in insertion order.
    pub async fn entries(&self) -> Vec<IndexEntry> {
        self.state.read().await.entries.clone()
    }

    fn check_vector(&self, vector: &[f32], what: &str) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(RagError::IndexInconsistency(format!(
                "{what} has dimension {} but the index expects {}",
                vector.len(),
                self.dimensions
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(RagError::IndexInconsistency(format!(
                "{what} contains non-finite components"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    async fn insert_batch(&self, entries: Vec<(Chunk, Vec<f32>)>) -> Result<Vec<u64>> {
        self.replace_documents(&[], entries).await
    }

    async fn replace_documents(
        &self,
        document_ids: &[&str],
        entries: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<Vec<u64>> {
        for (chunk, vector) in &entries {
            self.check_vector(vector, &format!("vector for chunk '{}'", chunk.id))?;
        }

        let mut state = self.state.write().await;
        let ids = state.replace(document_ids, entries);
        debug!(
            replaced_documents = document_ids.len(),
            inserted = ids.len(),
            size = state.entries.len(),
            "index batch applied"
        );
        Ok(ids)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.check_vector(query, "query vector")?;

        let state = self.state.read().await;
        if k == 0 || state.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, u64, usize)> = state
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (self.metric.score(&entry.vector, query), entry.id, pos))
            .collect();

        scored.sort_unstable_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, _, pos)| SearchResult { chunk: state.entries[pos].chunk.clone(), score })
            .collect())
    }

    async fn delete(&self, chunk_ids: &[&str]) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        let chunk_ids: HashSet<&str> = chunk_ids.iter().copied().collect();
        state.entries.retain(|e| !chunk_ids.contains(e.chunk.id.as_str()));
        Ok(before - state.entries.len())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state.entries.retain(|e| e.chunk.document_id != document_id);
        Ok(before - state.entries.len())
    }

    async fn size(&self) -> usize {
        self.state.read().await.entries.len()
    }
}
