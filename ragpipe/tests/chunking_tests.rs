//! Property tests for chunk boundaries, overlap and determinism.

use ragpipe::chunking::{Chunker, FixedSizeChunker, RecursiveChunker};
use ragpipe::document::{Chunk, Document};
use proptest::prelude::*;

/// Text built from words, punctuation and line breaks, including non-ASCII.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            "[a-z]{1,9}",
            Just(" ".to_string()),
            Just(". ".to_string()),
            Just("\n".to_string()),
            Just("\n\n".to_string()),
            Just("héllo wörld".to_string()),
            Just("猫は哺乳類".to_string()),
        ],
        0..120,
    )
    .prop_map(|parts| parts.concat())
}

/// Chunk size and an overlap strictly below it.
fn arb_sizes() -> impl Strategy<Value = (usize, usize)> {
    (1usize..80).prop_flat_map(|size| (Just(size), 0..size))
}

/// Drop the shared prefix of every chunk after the first and concatenate.
fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(&chunk.text);
        } else {
            text.extend(chunk.text.chars().skip(overlap));
        }
    }
    text
}

fn check_chunks(doc: &Document, chunks: &[Chunk], size: usize, overlap: usize) {
    if doc.text.is_empty() {
        assert!(chunks.is_empty());
        return;
    }
    assert!(!chunks.is_empty());
    for (i, chunk) in chunks.iter().enumerate() {
        assert!(chunk.char_len() <= size, "chunk {i} has {} chars > {size}", chunk.char_len());
        assert!(chunk.char_len() > 0);
        assert_eq!(&doc.text[chunk.start..chunk.end], chunk.text);
        assert_eq!(chunk.index, i);
        assert_eq!(chunk.id, format!("{}_{i}", doc.id));
    }
    for pair in chunks.windows(2) {
        let first: Vec<char> = pair[0].text.chars().collect();
        let shared: String = first[first.len().saturating_sub(overlap)..].iter().collect();
        let head: String = pair[1].text.chars().take(overlap).collect();
        assert_eq!(shared, head, "consecutive chunks must share exactly the overlap");
        assert!(pair[1].start > pair[0].start, "chunks must make progress");
    }
    assert_eq!(reassemble(chunks, overlap), doc.text);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn recursive_chunks_cover_text_within_size(text in arb_text(), (size, overlap) in arb_sizes()) {
        let doc = Document::new("doc", text);
        let chunker = RecursiveChunker::new(size, overlap).unwrap();
        let chunks = chunker.chunk(&doc);
        check_chunks(&doc, &chunks, size, overlap);
    }

    #[test]
    fn fixed_chunks_cover_text_within_size(text in arb_text(), (size, overlap) in arb_sizes()) {
        let doc = Document::new("doc", text);
        let chunker = FixedSizeChunker::new(size, overlap).unwrap();
        let chunks = chunker.chunk(&doc);
        check_chunks(&doc, &chunks, size, overlap);
    }

    #[test]
    fn chunking_is_deterministic(text in arb_text(), (size, overlap) in arb_sizes()) {
        let doc = Document::new("doc", text);
        let chunker = RecursiveChunker::new(size, overlap).unwrap();
        prop_assert_eq!(chunker.chunk(&doc), chunker.chunk(&doc));
    }
}

#[test]
fn default_sizes_split_fifteen_hundred_chars_in_two() {
    let text: String = "abcde ".repeat(250);
    assert_eq!(text.chars().count(), 1500);
    let doc = Document::new("long", text);
    let chunks = RecursiveChunker::new(1000, 200).unwrap().chunk(&doc);

    assert_eq!(chunks.len(), 2);
    let tail: String = chunks[0].text.chars().skip(chunks[0].char_len() - 200).collect();
    let head: String = chunks[1].text.chars().take(200).collect();
    assert_eq!(tail, head);
    assert_eq!(reassemble(&chunks, 200), doc.text);
}
