//! Generator trait for producing structured answers from a prompt.

use async_trait::async_trait;

use crate::error::Result;
use crate::prompt::Prompt;
use crate::schema::OutputSchema;

/// A language model that answers an assembled [`Prompt`].
///
/// Implementations return the model's raw text. The pipeline validates that
/// text against the [`OutputSchema`] after every call; generators may use the
/// schema to request constrained output but must not be relied upon to
/// enforce it.
///
/// # Example
///
/// ```rust,ignore
/// use ragpipe::{Generator, OutputSchema};
///
/// let schema = OutputSchema::structured_response()?;
/// let raw = generator.generate(&prompt, &schema).await?;
/// let response: StructuredResponse = schema.validate(&raw)?;
/// ```
#[async_trait]
pub trait Generator: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Produce raw output for the prompt.
    async fn generate(&self, prompt: &Prompt, schema: &OutputSchema) -> Result<String>;
}
