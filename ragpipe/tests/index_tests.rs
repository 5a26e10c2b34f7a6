//! Property tests for in-memory vector index ranking, plus a concurrency
//! check for atomic batch inserts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ragpipe::document::Chunk;
use ragpipe::index::VectorIndex;
use ragpipe::inmemory::InMemoryVectorIndex;
use ragpipe::similarity::SimilarityMetric;
use proptest::prelude::*;

const DIM: usize = 8;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-3 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

fn arb_metric() -> impl Strategy<Value = SimilarityMetric> {
    prop_oneof![
        Just(SimilarityMetric::Cosine),
        Just(SimilarityMetric::Dot),
        Just(SimilarityMetric::Euclidean),
    ]
}

fn chunk(id: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        document_id: "doc".to_string(),
        index: 0,
        start: 0,
        end: id.len(),
        text: id.to_string(),
        metadata: HashMap::new(),
    }
}

fn build_index(metric: SimilarityMetric, vectors: &[Vec<f32>]) -> InMemoryVectorIndex {
    let index = InMemoryVectorIndex::new(DIM, metric);
    let entries: Vec<(Chunk, Vec<f32>)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (chunk(&format!("c{i}")), v.clone()))
        .collect();
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(index.insert_batch(entries)).unwrap();
    index
}

mod prop_search_ranking {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_unique_and_bounded_by_k(
            vectors in proptest::collection::vec(arb_normalized_embedding(DIM), 1..30),
            query in arb_normalized_embedding(DIM),
            metric in arb_metric(),
            k in 1usize..40,
        ) {
            let index = build_index(metric, &vectors);
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(index.search(&query, k)).unwrap();

            prop_assert_eq!(results.len(), k.min(vectors.len()));

            let ids: HashSet<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
            prop_assert_eq!(ids.len(), results.len());

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }

            // The top score is the best score over every stored vector.
            let best = vectors
                .iter()
                .map(|v| metric.score(v, &query))
                .fold(f32::NEG_INFINITY, f32::max);
            prop_assert!((results[0].score - best).abs() < 1e-6);
        }

        #[test]
        fn stored_vector_ranks_itself_first(
            vectors in proptest::collection::vec(arb_normalized_embedding(DIM), 1..30),
            pick in any::<prop::sample::Index>(),
            use_cosine in any::<bool>(),
        ) {
            // Dot product does not guarantee self-similarity is maximal.
            let metric = if use_cosine {
                SimilarityMetric::Cosine
            } else {
                SimilarityMetric::Euclidean
            };
            let index = build_index(metric, &vectors);
            let query = pick.get(&vectors).clone();

            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(index.search(&query, 1)).unwrap();

            let self_score = metric.score(&query, &query);
            prop_assert!(results[0].score <= self_score + 1e-5);
            prop_assert!(results[0].score >= self_score - 1e-5);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_searches_never_see_partial_batches() {
    const BATCH: usize = 16;
    const BATCHES: usize = 20;

    let index = Arc::new(InMemoryVectorIndex::new(DIM, SimilarityMetric::Cosine));

    let writer = {
        let index = Arc::clone(&index);
        tokio::spawn(async move {
            for b in 0..BATCHES {
                let entries: Vec<(Chunk, Vec<f32>)> = (0..BATCH)
                    .map(|i| {
                        let mut v = vec![0.0f32; DIM];
                        v[(b + i) % DIM] = 1.0;
                        (chunk(&format!("b{b}_{i}")), v)
                    })
                    .collect();
                index.insert_batch(entries).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let index = Arc::clone(&index);
            tokio::spawn(async move {
                let query = vec![1.0f32; DIM];
                for _ in 0..50 {
                    let results = index.search(&query, BATCH * BATCHES).await.unwrap();
                    assert_eq!(results.len() % BATCH, 0, "search observed a partial batch");
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(index.size().await, BATCH * BATCHES);
}
