//! Configuration for the RAG pipeline.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::retry::{CallPolicy, RetryPolicy};
use crate::similarity::SimilarityMetric;

/// Instructions sent as the system message when none are configured.
///
/// `{context}` is replaced with the retrieved context block.
pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You are a helpful assistant. Answer the user's \
question using only the context below. If the context does not contain the answer, say so. \
Also write a short poem related to the answer and suggest one follow-up question the user \
might ask next.\n\nContext:\n{context}";

/// Configuration parameters for the RAG pipeline.
///
/// Built once at startup and owned by the pipeline; it is never mutated
/// afterwards. Use [`RagConfig::builder`] or [`RagConfig::from_json_file`] to
/// obtain a validated instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of top results to return from vector search.
    pub top_k: usize,
    /// Metric used both when ranking at query time and by the index.
    pub similarity_metric: SimilarityMetric,
    /// Dimensionality of every embedding vector. Must match the embedder.
    pub embedding_dimension: usize,
    /// Maximum size of the assembled prompt, in estimated tokens.
    pub prompt_token_budget: usize,
    /// Minimum similarity score for results. `None` keeps every top-k result.
    pub similarity_threshold: Option<f32>,
    /// Retry policy for embedder and generator calls.
    pub retry_policy: RetryPolicy,
    /// Per-attempt deadline for embedder and generator calls, in milliseconds.
    pub collaborator_timeout_ms: u64,
    /// Number of documents embedded concurrently during batch ingestion.
    pub ingest_concurrency: usize,
    /// System instructions for the generator.
    pub system_instructions: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            similarity_metric: SimilarityMetric::Cosine,
            embedding_dimension: 1536,
            prompt_token_budget: 3000,
            similarity_threshold: None,
            retry_policy: RetryPolicy::default(),
            collaborator_timeout_ms: 30_000,
            ingest_concurrency: 4,
            system_instructions: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Parse a JSON document over the defaults and validate the result.
    ///
    /// Keys that are absent keep their default value.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RagConfig = serde_json::from_str(json)
            .map_err(|e| RagError::ConfigError(format!("invalid configuration JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file. See [`RagConfig::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            RagError::ConfigError(format!("failed to read config '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// The timeout and retry policy for collaborator calls.
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy::new(
            self.retry_policy.clone(),
            Duration::from_millis(self.collaborator_timeout_ms),
        )
    }

    /// Check that all parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `embedding_dimension == 0`
    /// - `prompt_token_budget == 0`
    /// - `collaborator_timeout_ms == 0` or `ingest_concurrency == 0`
    /// - `similarity_threshold` is NaN or infinite
    /// - the retry policy makes zero attempts
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.embedding_dimension == 0 {
            return Err(RagError::ConfigError(
                "embedding_dimension must be greater than zero".to_string(),
            ));
        }
        if self.prompt_token_budget == 0 {
            return Err(RagError::ConfigError(
                "prompt_token_budget must be greater than zero".to_string(),
            ));
        }
        if self.collaborator_timeout_ms == 0 {
            return Err(RagError::ConfigError(
                "collaborator_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.ingest_concurrency == 0 {
            return Err(RagError::ConfigError(
                "ingest_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.similarity_threshold.is_some_and(|t| !t.is_finite()) {
            return Err(RagError::ConfigError("similarity_threshold must be finite".to_string()));
        }
        self.retry_policy.validate()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the similarity metric.
    pub fn similarity_metric(mut self, metric: SimilarityMetric) -> Self {
        self.config.similarity_metric = metric;
        self
    }

    /// Set the embedding dimensionality.
    pub fn embedding_dimension(mut self, dimension: usize) -> Self {
        self.config.embedding_dimension = dimension;
        self
    }

    /// Set the prompt budget in estimated tokens.
    pub fn prompt_token_budget(mut self, budget: usize) -> Self {
        self.config.prompt_token_budget = budget;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Set the retry policy for collaborator calls.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    /// Set the per-attempt collaborator timeout.
    pub fn collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.config.collaborator_timeout_ms =
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set how many documents are embedded concurrently during batch ingestion.
    pub fn ingest_concurrency(mut self, concurrency: usize) -> Self {
        self.config.ingest_concurrency = concurrency;
        self
    }

    /// Set the generator's system instructions.
    pub fn system_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.system_instructions = instructions.into();
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RagConfig::default();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.top_k, 4);
        assert_eq!(config.similarity_metric, SimilarityMetric::Cosine);
        assert_eq!(config.similarity_threshold, None);
        assert_eq!(config.retry_policy.max_attempts, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_overlap_not_below_chunk_size() {
        let result = RagConfig::builder().chunk_size(100).chunk_overlap(100).build();
        assert!(matches!(result, Err(RagError::ConfigError(_))));
    }

    #[test]
    fn rejects_zero_top_k() {
        assert!(RagConfig::builder().top_k(0).build().is_err());
    }

    #[test]
    fn rejects_zero_dimension_and_budget() {
        assert!(RagConfig::builder().embedding_dimension(0).build().is_err());
        assert!(RagConfig::builder().prompt_token_budget(0).build().is_err());
    }

    #[test]
    fn rejects_nan_threshold() {
        assert!(RagConfig::builder().similarity_threshold(f32::NAN).build().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RagConfig::from_json_str(
            r#"{"chunk_size": 500, "chunk_overlap": 50, "similarity_metric": "euclidean",
                "retry_policy": {"max_attempts": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.top_k, 4);
        assert_eq!(config.similarity_metric, SimilarityMetric::Euclidean);
        assert_eq!(config.retry_policy.max_attempts, 3);
        assert_eq!(config.retry_policy.backoff_base_ms, 200);
    }

    #[test]
    fn invalid_json_values_are_config_errors() {
        let result = RagConfig::from_json_str(r#"{"chunk_size": 10, "chunk_overlap": 20}"#);
        assert!(matches!(result, Err(RagError::ConfigError(_))));
        let result = RagConfig::from_json_str(r#"{"similarity_metric": "manhattan"}"#);
        assert!(matches!(result, Err(RagError::ConfigError(_))));
    }

    #[test]
    fn call_policy_uses_configured_timeout() {
        let config =
            RagConfig::builder().collaborator_timeout(Duration::from_secs(2)).build().unwrap();
        assert_eq!(config.call_policy().timeout(), Duration::from_secs(2));
    }
}
