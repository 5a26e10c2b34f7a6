//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`RecursiveChunker`]: cuts at the best natural boundary (paragraph, line,
//!   sentence, then word) inside each window, falling back to a hard cut
//! - [`FixedSizeChunker`]: always cuts at exactly `chunk_size` characters
//!
//! Both measure length in characters and produce contiguous spans of the
//! source text. Consecutive chunks share exactly `chunk_overlap` characters:
//! each chunk starts `chunk_overlap` characters before the previous one ends.
//! Dropping the first `chunk_overlap` characters of every chunk after the first
//! and concatenating the rest therefore reproduces the document text.

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
///
/// Implementations must be deterministic: the same document always yields the
/// same chunk sequence.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Separators tried in order by [`RecursiveChunker`].
const NATURAL_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " "];

/// Split `document` with a [`RecursiveChunker`].
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] if `chunk_size == 0` or
/// `overlap >= chunk_size`.
pub fn split(document: &Document, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(RecursiveChunker::new(chunk_size, overlap)?.chunk(document))
}

/// Splits text at natural boundaries.
///
/// For each window of `chunk_size` characters the chunker looks for the last
/// paragraph break (`\n\n`), then line break, then sentence end (`. `, `! `,
/// `? `), then space. A boundary is only accepted if the resulting chunk is
/// longer than the overlap and at least half of `chunk_size`; otherwise the
/// window is cut hard at `chunk_size`.
///
/// # Example
///
/// ```rust,ignore
/// use ragpipe::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1000, 200)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    splitter: TextSplitter,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of characters shared by consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Ok(Self { splitter: TextSplitter::new(chunk_size, chunk_overlap, NATURAL_SEPARATORS)? })
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.splitter.chunk(document)
    }
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// # Example
///
/// ```rust,ignore
/// use ragpipe::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(256, 50)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    splitter: TextSplitter,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Ok(Self { splitter: TextSplitter::new(chunk_size, chunk_overlap, &[])? })
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.splitter.chunk(document)
    }
}

#[derive(Debug, Clone)]
struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &'static [&'static str],
}

impl TextSplitter {
    fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        separators: &'static [&'static str],
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap, separators })
    }

    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.spans(&document.text)
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| {
                let mut metadata = document.metadata.clone();
                metadata.insert("chunk_index".to_string(), index.to_string());
                Chunk {
                    id: format!("{}_{index}", document.id),
                    document_id: document.id.clone(),
                    index,
                    start,
                    end,
                    text: document.text[start..end].to_string(),
                    metadata,
                }
            })
            .collect()
    }

    /// Byte spans of each chunk.
    fn spans(&self, text: &str) -> Vec<(usize, usize)> {
        // offsets[i] is the byte offset of character i; the last entry is text.len().
        let offsets: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let total = offsets.len() - 1;

        let mut spans = Vec::new();
        if total == 0 {
            return spans;
        }

        let mut start = 0;
        loop {
            let hard_end = (start + self.chunk_size).min(total);
            if hard_end == total {
                spans.push((offsets[start], offsets[total]));
                break;
            }
            let end = self.boundary(text, &offsets, start, hard_end);
            spans.push((offsets[start], offsets[end]));
            // end - start > chunk_overlap, so this always advances.
            start = end - self.chunk_overlap;
        }

        spans
    }

    /// Character position at which to end the chunk starting at `start`.
    fn boundary(&self, text: &str, offsets: &[usize], start: usize, hard_end: usize) -> usize {
        let min_len = (self.chunk_overlap + 1).max(self.chunk_size.div_ceil(2));
        let window_start = offsets[start];
        let window = &text[window_start..offsets[hard_end]];
        let min_cut = offsets[start + min_len] - window_start;

        for separator in self.separators {
            let Some(pos) = window.rfind(separator) else {
                continue;
            };
            let cut = pos + separator.len();
            if cut < min_cut {
                continue;
            }
            if let Ok(end) = offsets.binary_search(&(window_start + cut)) {
                return end;
            }
        }

        hard_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
        let mut text = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let skip = if i == 0 { 0 } else { overlap };
            text.extend(chunk.text.chars().skip(skip));
        }
        text
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        let chunker = RecursiveChunker::new(100, 10).unwrap();
        assert!(chunker.chunk(&Document::new("d", "")).is_empty());
    }

    #[test]
    fn short_document_yields_one_chunk() {
        let chunker = RecursiveChunker::new(100, 10).unwrap();
        let chunks = chunker.chunk(&Document::new("d", "Cats are mammals."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Cats are mammals.");
        assert_eq!(chunks[0].id, "d_0");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 17));
        assert_eq!(chunks[0].metadata.get("chunk_index").map(String::as_str), Some("0"));
    }

    #[test]
    fn overlap_must_be_below_chunk_size() {
        assert!(matches!(RecursiveChunker::new(10, 10), Err(RagError::ConfigError(_))));
        assert!(matches!(FixedSizeChunker::new(10, 11), Err(RagError::ConfigError(_))));
        assert!(matches!(FixedSizeChunker::new(0, 0), Err(RagError::ConfigError(_))));
        assert!(split(&Document::new("d", "x"), 5, 5).is_err());
    }

    #[test]
    fn fixed_size_cuts_exactly() {
        let text: String = ('a'..='z').collect();
        let chunker = FixedSizeChunker::new(10, 3).unwrap();
        let chunks = chunker.chunk(&Document::new("d", text.clone()));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcdefghij", "hijklmnopq", "opqrstuvwx", "vwxyz"]);
        assert_eq!(reconstruct(&chunks, 3), text);
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = format!("{}\n\n{}", "a".repeat(30), "b".repeat(30));
        let chunker = RecursiveChunker::new(40, 0).unwrap();
        let chunks = chunker.chunk(&Document::new("d", text.clone()));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, format!("{}\n\n", "a".repeat(30)));
        assert_eq!(chunks[1].text, "b".repeat(30));
        assert_eq!(reconstruct(&chunks, 0), text);
    }

    #[test]
    fn prefers_sentence_over_word_boundaries() {
        let text = "One two three. Four five six seven eight nine ten eleven.";
        let chunker = RecursiveChunker::new(30, 0).unwrap();
        let chunks = chunker.chunk(&Document::new("d", text));
        assert_eq!(chunks[0].text, "One two three. ");
    }

    #[test]
    fn rejects_boundaries_that_make_tiny_chunks() {
        // The only space sits at position 2, far below half the chunk size.
        let text = format!("ab {}", "c".repeat(40));
        let chunker = RecursiveChunker::new(20, 5).unwrap();
        let chunks = chunker.chunk(&Document::new("d", text));
        assert_eq!(chunks[0].char_len(), 20);
    }

    #[test]
    fn consecutive_chunks_share_exact_overlap() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let chunker = RecursiveChunker::new(100, 25).unwrap();
        let chunks = chunker.chunk(&Document::new("d", text.clone()));
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail: String = pair[0].text.chars().skip(pair[0].char_len() - 25).collect();
            let head: String = pair[1].text.chars().take(25).collect();
            assert_eq!(tail, head);
        }
        for chunk in &chunks {
            assert!(chunk.char_len() <= 100);
            assert_eq!(&text[chunk.start..chunk.end], chunk.text);
        }
        assert_eq!(reconstruct(&chunks, 25), text);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(25);
        let chunker = FixedSizeChunker::new(10, 2).unwrap();
        let chunks = chunker.chunk(&Document::new("d", text.clone()));
        assert!(chunks.iter().all(|c| c.char_len() <= 10));
        assert_eq!(chunks[0].char_len(), 10);
        assert_eq!(chunks[0].end, 20);
        assert_eq!(reconstruct(&chunks, 2), text);
    }

    #[test]
    fn inherits_document_metadata() {
        let doc = Document::new("d", "x".repeat(30)).with_metadata("source", "web");
        let chunks = FixedSizeChunker::new(10, 0).unwrap().chunk(&doc);
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.get("source").map(String::as_str), Some("web"));
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.id, format!("d_{i}"));
        }
    }
}
