//! Offline collaborators for demos and tests.
//!
//! [`MockEmbeddingProvider`] produces deterministic bag-of-words vectors, so
//! texts that share words are similar. [`MockGenerator`] answers from the
//! retrieved context or returns a canned reply.

use async_trait::async_trait;
use serde_json::json;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::generator::Generator;
use crate::prompt::{Prompt, Role};
use crate::schema::OutputSchema;

/// Deterministic embeddings from hashed word counts.
///
/// Each lowercase alphanumeric word is hashed (FNV-1a) into one of
/// `dimensions` buckets and counted; the result is L2-normalised. Text with
/// no words embeds to the zero vector.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    /// Create a provider producing `dimensions`-length vectors.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, word: &str) -> usize {
        let hash = word
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| {
                (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
            });
        (hash % self.dimensions as u64) as usize
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut emb = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return Ok(emb);
        }
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            emb[self.bucket(&word.to_lowercase())] += 1.0;
        }
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A generator that needs no model.
///
/// By default it answers with the top context passage, writes a two-line
/// poem about the question and asks to go deeper. With
/// [`MockGenerator::with_reply`] it returns the given text verbatim, which
/// is useful for exercising schema validation.
#[derive(Debug, Clone, Default)]
pub struct MockGenerator {
    reply: Option<String>,
}

impl MockGenerator {
    /// Create an extractive mock generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Always return `reply`.
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self { reply: Some(reply.into()) }
    }
}

#[async_trait]
impl Generator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &Prompt, _schema: &OutputSchema) -> Result<String> {
        if let Some(reply) = &self.reply {
            return Ok(reply.clone());
        }

        let question = prompt.message(Role::Human).unwrap_or_default().trim();
        let answer = prompt
            .context
            .split("\n\n")
            .map(str::trim)
            .find(|p| !p.is_empty())
            .map_or_else(
                || "I don't know based on the available context.".to_string(),
                str::to_string,
            );

        Ok(json!({
            "answer": answer,
            "poem": format!("You asked: {question}\nThe pages answered, line by line."),
            "followup_question": format!("What else would you like to know about \"{question}\"?"),
        })
        .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::SimilarityMetric;

    #[tokio::test]
    async fn shared_words_increase_similarity() {
        let provider = MockEmbeddingProvider::new(256);
        let query = provider.embed("What are cats?").await.unwrap();
        let cats = provider.embed("Cats are mammals.").await.unwrap();
        let dogs = provider.embed("Dogs are loyal.").await.unwrap();

        let metric = SimilarityMetric::Cosine;
        assert!(metric.score(&query, &cats) > metric.score(&query, &dogs));
    }

    #[tokio::test]
    async fn embeddings_are_deterministic_and_normalised() {
        let provider = MockEmbeddingProvider::new(32);
        let a = provider.embed("Hello, world").await.unwrap();
        let b = provider.embed("hello WORLD").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(provider.embed("  ...  ").await.unwrap().iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn default_reply_satisfies_schema() {
        let schema = OutputSchema::structured_response().unwrap();
        let prompt = crate::prompt::PromptAssembler::new(500)
            .unwrap()
            .assemble("Answer.", &crate::document::RetrievedContext::default(), "Why?")
            .unwrap();
        let raw = MockGenerator::new().generate(&prompt, &schema).await.unwrap();
        let response: crate::schema::StructuredResponse = schema.validate(&raw).unwrap();
        assert!(response.followup_question.contains("Why?"));
    }
}
