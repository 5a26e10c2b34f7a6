//! Data types for documents, chunks, index entries and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Source locator, unique within an index.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Optional URI pointing to the original source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: HashMap::new(), source_uri: None }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A contiguous span of a [`Document`].
///
/// `start` and `end` are byte offsets into the parent text, so
/// `&document.text[chunk.start..chunk.end] == chunk.text`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier, `{document_id}_{index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Ordinal position within the parent document.
    pub index: usize,
    /// Byte offset of the first character in the parent text.
    pub start: usize,
    /// Byte offset one past the last character in the parent text.
    pub end: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Metadata inherited from the parent document plus `chunk_index`.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A chunk together with its embedding, as stored by a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Identifier assigned by the index on insertion. Increases monotonically,
    /// so it also records insertion order.
    pub id: u64,
    /// The stored chunk.
    pub chunk: Chunk,
    /// The chunk's embedding vector.
    pub vector: Vec<f32>,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Chunks returned for a query, most similar first, without duplicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievedContext {
    /// The ranked chunks.
    pub chunks: Vec<Chunk>,
}

impl RetrievedContext {
    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no chunk was retrieved.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Iterate over the chunks in rank order.
    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }
}

impl From<Vec<SearchResult>> for RetrievedContext {
    fn from(results: Vec<SearchResult>) -> Self {
        let mut chunks: Vec<Chunk> = Vec::with_capacity(results.len());
        for result in results {
            if !chunks.iter().any(|c| c.id == result.chunk.id) {
                chunks.push(result.chunk);
            }
        }
        Self { chunks }
    }
}
