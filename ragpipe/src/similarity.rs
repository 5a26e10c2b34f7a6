//! Vector similarity metrics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// The similarity function used to rank index entries against a query.
///
/// Every metric produces a score where higher means more similar. For
/// [`SimilarityMetric::Euclidean`] that score is the negated L2 distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Cosine of the angle between the vectors. Zero-magnitude vectors score 0.0.
    #[default]
    Cosine,
    /// Raw inner product.
    Dot,
    /// Negated Euclidean distance.
    Euclidean,
}

impl SimilarityMetric {
    /// Score `a` against `b`. Both slices must have the same length.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::Dot => dot(a, b),
            Self::Euclidean => -euclidean_distance(a, b),
        }
    }

    /// The configuration name of this metric.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Dot => "dot",
            Self::Euclidean => "euclidean",
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMetric {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" | "inner_product" => Ok(Self::Dot),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(RagError::ConfigError(format!(
                "unknown similarity metric '{other}' (expected cosine, dot or euclidean)"
            ))),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let score = SimilarityMetric::Cosine.score(&[1.0, 2.0], &[2.0, 4.0]);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        assert_eq!(SimilarityMetric::Cosine.score(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn euclidean_is_negated_distance() {
        let score = SimilarityMetric::Euclidean.score(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((score + 5.0).abs() < 1e-6);
        assert_eq!(SimilarityMetric::Euclidean.score(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn dot_is_inner_product() {
        assert_eq!(SimilarityMetric::Dot.score(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
    }

    #[test]
    fn parses_and_serializes_lowercase_names() {
        assert_eq!("Cosine".parse::<SimilarityMetric>().unwrap(), SimilarityMetric::Cosine);
        assert_eq!("l2".parse::<SimilarityMetric>().unwrap(), SimilarityMetric::Euclidean);
        assert!("manhattan".parse::<SimilarityMetric>().is_err());
        assert_eq!(serde_json::to_string(&SimilarityMetric::Dot).unwrap(), "\"dot\"");
    }
}
