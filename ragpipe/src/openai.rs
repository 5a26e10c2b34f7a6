//! Embedding and generation backed by the OpenAI HTTP API.
//!
//! This module is only available when the `openai` feature is enabled.
//! Both collaborators accept a custom base URL, so any OpenAI-compatible
//! server works.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generator::Generator;
use crate::prompt::{Prompt, Role};
use crate::schema::OutputSchema;

/// The default OpenAI API base URL.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// The default chat model.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

const PROVIDER: &str = "openai";

fn api_key_from_env() -> Result<String> {
    std::env::var("OPENAI_API_KEY").map_err(|_| {
        RagError::ConfigError("OPENAI_API_KEY environment variable not set".to_string())
    })
}

fn check_api_key(api_key: &str) -> Result<()> {
    if api_key.is_empty() {
        return Err(RagError::ConfigError("OpenAI API key must not be empty".to_string()));
    }
    Ok(())
}

/// Map a transport failure onto the error taxonomy.
fn request_error(e: &reqwest::Error, timeout: Option<Duration>) -> RagError {
    error!(provider = PROVIDER, error = %e, "request failed");
    if e.is_timeout() {
        RagError::CollaboratorTimeout {
            provider: PROVIDER.to_string(),
            timeout_ms: timeout
                .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
        }
    } else {
        RagError::CollaboratorUnavailable {
            provider: PROVIDER.to_string(),
            message: format!("request failed: {e}"),
        }
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
fn status_error(status: StatusCode, body: String) -> RagError {
    let detail =
        serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    error!(provider = PROVIDER, %status, "API error");

    let provider = PROVIDER.to_string();
    let message = format!("API returned {status}: {detail}");
    match status {
        StatusCode::TOO_MANY_REQUESTS => RagError::CollaboratorQuota { provider, message },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            RagError::InvalidInput { provider, message }
        }
        _ => RagError::CollaboratorUnavailable { provider, message },
    }
}

async fn post_json<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &B,
    timeout: Option<Duration>,
) -> Result<R> {
    let mut request = client.post(url).bearer_auth(api_key).json(body);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let response = request.send().await.map_err(|e| request_error(&e, timeout))?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, body));
    }

    response.json().await.map_err(|e| {
        error!(provider = PROVIDER, error = %e, "failed to parse response");
        RagError::InvalidInput {
            provider: PROVIDER.to_string(),
            message: format!("failed to parse response: {e}"),
        }
    })
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
///
/// # Example
///
/// ```rust,ignore
/// use ragpipe::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
    timeout: Option<Duration>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`) and dimensions (1536).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        check_api_key(&api_key)?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_API_BASE.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
            timeout: None,
        })
    }

    /// Create a new provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env()?)
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// Use an OpenAI-compatible server at `base_url` (e.g. `http://localhost:8080/v1`).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Bound each HTTP request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::InvalidInput {
            provider: PROVIDER.to_string(),
            message: "API returned empty response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };
        let url = format!("{}/embeddings", self.base_url);
        let mut response: EmbeddingResponse =
            post_json(&self.client, &url, &self.api_key, &request_body, self.timeout).await?;

        response.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A [`Generator`] backed by the OpenAI chat completions API.
///
/// Requests a strict JSON-schema response format built from the
/// [`OutputSchema`]; the pipeline still validates the reply.
pub struct OpenAIGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: Option<f32>,
    timeout: Option<Duration>,
}

impl OpenAIGenerator {
    /// Create a generator with the given API key and the default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        check_api_key(&api_key)?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_API_BASE.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: None,
            timeout: None,
        })
    }

    /// Create a generator using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env()?)
    }

    /// Set the chat model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Use an OpenAI-compatible server at `base_url`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Bound each HTTP request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

fn response_format(schema: &OutputSchema) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "structured_response",
            "schema": schema.json_schema(),
            "strict": true
        }
    })
}

fn chat_messages(prompt: &Prompt) -> Vec<ChatMessage<'_>> {
    prompt
        .messages
        .iter()
        .map(|m| ChatMessage {
            role: match m.role {
                Role::System => "system",
                Role::Human => "user",
            },
            content: &m.content,
        })
        .collect()
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, prompt: &Prompt, schema: &OutputSchema) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            estimated_tokens = prompt.estimated_tokens,
            "generating"
        );

        let request_body = ChatRequest {
            model: &self.model,
            messages: chat_messages(prompt),
            response_format: response_format(schema),
            temperature: self.temperature,
        };
        let url = format!("{}/chat/completions", self.base_url);
        let response: ChatResponse =
            post_json(&self.client, &url, &self.api_key, &request_body, self.timeout).await?;

        let message = response.choices.into_iter().next().map(|c| c.message).ok_or_else(|| {
            RagError::InvalidInput {
                provider: PROVIDER.to_string(),
                message: "API returned no choices".into(),
            }
        })?;

        match (message.content, message.refusal) {
            (Some(content), _) => Ok(content),
            (None, Some(refusal)) => Err(RagError::SchemaValidation(format!(
                "model refused to answer: {refusal}"
            ))),
            (None, None) => Err(RagError::SchemaValidation("model returned no content".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new()).kind(),
            ErrorKind::CollaboratorQuota
        );
        assert_eq!(
            status_error(StatusCode::BAD_REQUEST, String::new()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, String::new()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, String::new()).kind(),
            ErrorKind::CollaboratorUnavailable
        );
    }

    #[test]
    fn error_body_detail_is_extracted() {
        let err = status_error(
            StatusCode::BAD_REQUEST,
            r#"{"error": {"message": "input too long"}}"#.to_string(),
        );
        assert!(err.to_string().contains("input too long"));
    }

    #[test]
    fn response_format_is_strict_json_schema() {
        let schema = OutputSchema::structured_response().unwrap();
        let format = response_format(&schema);
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["strict"], true);
        assert_eq!(format["json_schema"]["schema"]["additionalProperties"], false);
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(OpenAIEmbeddingProvider::new("").is_err());
        assert!(OpenAIGenerator::new("").is_err());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let generator =
            OpenAIGenerator::new("sk-test").unwrap().with_base_url("http://localhost:8080/v1/");
        assert_eq!(generator.base_url, "http://localhost:8080/v1");
    }
}
