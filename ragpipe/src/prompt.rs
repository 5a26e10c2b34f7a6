//! Prompt assembly: merge retrieved context and the user query into a
//! role-tagged prompt that fits a token budget.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::RetrievedContext;
use crate::error::{RagError, Result};

/// Placeholder in the system instructions replaced by the context block.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// Delimiter placed between chunk texts in the context block.
pub const DEFAULT_CONTEXT_DELIMITER: &str = "\n\n";

/// Estimate the token count of `text` as one token per four characters,
/// rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// The author of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Fixed instructions plus retrieved context.
    System,
    /// The literal user query.
    Human,
}

/// One role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Who the message is from.
    pub role: Role,
    /// Message text.
    pub content: String,
}

/// A structured prompt ready for a [`Generator`](crate::Generator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    /// System message followed by the human message.
    pub messages: Vec<PromptMessage>,
    /// The context block embedded in the system message.
    pub context: String,
    /// IDs of the chunks that made it into the context, in rank order.
    pub included_chunk_ids: Vec<String>,
    /// Whether any retrieved chunk was dropped or cut to fit the budget.
    pub truncated: bool,
    /// Estimated size of the whole prompt in tokens.
    pub estimated_tokens: usize,
}

impl Prompt {
    /// Content of the first message with the given role.
    pub fn message(&self, role: Role) -> Option<&str> {
        self.messages.iter().find(|m| m.role == role).map(|m| m.content.as_str())
    }

    /// The system message.
    pub fn system(&self) -> Option<&str> {
        self.message(Role::System)
    }

    /// The human message (the user query).
    pub fn human(&self) -> Option<&str> {
        self.message(Role::Human)
    }
}

/// Builds [`Prompt`]s within a token budget.
///
/// Chunks are added in rank order. When the next chunk would exceed the
/// budget it and every lower-ranked chunk are dropped. If not even the top
/// chunk fits, its leading part is kept instead. Either way the prompt's
/// `truncated` flag is set.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    token_budget: usize,
    delimiter: String,
}

impl PromptAssembler {
    /// Create an assembler with the given budget in estimated tokens.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `token_budget == 0`.
    pub fn new(token_budget: usize) -> Result<Self> {
        if token_budget == 0 {
            return Err(RagError::ConfigError(
                "prompt_token_budget must be greater than zero".to_string(),
            ));
        }
        Ok(Self { token_budget, delimiter: DEFAULT_CONTEXT_DELIMITER.to_string() })
    }

    /// Use a different delimiter between chunks.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// The budget in estimated tokens.
    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    /// Estimated tokens of the system message with an empty context block.
    pub fn instruction_tokens(&self, system_instructions: &str) -> usize {
        estimate_tokens(&render_system(system_instructions, ""))
    }

    /// Check that the system instructions and the query fit the budget
    /// before any context is added.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if they do not.
    pub fn check_budget(&self, system_instructions: &str, user_query: &str) -> Result<()> {
        let base = self.instruction_tokens(system_instructions) + estimate_tokens(user_query);
        if base > self.token_budget {
            return Err(RagError::ConfigError(format!(
                "prompt_token_budget ({}) cannot hold the system instructions and query \
                 ({base} tokens)",
                self.token_budget
            )));
        }
        Ok(())
    }

    /// Assemble the prompt.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the system instructions and the
    /// query alone exceed the budget.
    pub fn assemble(
        &self,
        system_instructions: &str,
        context: &RetrievedContext,
        user_query: &str,
    ) -> Result<Prompt> {
        let cost = |block: &str| {
            estimate_tokens(&render_system(system_instructions, block))
                + estimate_tokens(user_query)
        };

        self.check_budget(system_instructions, user_query)?;

        let mut block = String::new();
        let mut included = Vec::new();
        for chunk in context.iter() {
            let candidate = if block.is_empty() {
                chunk.text.clone()
            } else {
                format!("{block}{}{}", self.delimiter, chunk.text)
            };
            if cost(&candidate) > self.token_budget {
                break;
            }
            block = candidate;
            included.push(chunk.id.clone());
        }

        let mut truncated = included.len() < context.len();
        if included.is_empty() {
            if let Some(top) = context.chunks.first() {
                let head =
                    longest_fitting_prefix(&top.text, |head| cost(head) <= self.token_budget);
                if !head.is_empty() {
                    block = head.to_string();
                    included.push(top.id.clone());
                }
                truncated = true;
            }
        }

        let system = render_system(system_instructions, &block);
        let estimated_tokens = estimate_tokens(&system) + estimate_tokens(user_query);
        debug!(
            included = included.len(),
            retrieved = context.len(),
            truncated,
            estimated_tokens,
            "prompt assembled"
        );

        Ok(Prompt {
            messages: vec![
                PromptMessage { role: Role::System, content: system },
                PromptMessage { role: Role::Human, content: user_query.to_string() },
            ],
            context: block,
            included_chunk_ids: included,
            truncated,
            estimated_tokens,
        })
    }
}

/// Insert the context block into the system instructions.
fn render_system(instructions: &str, context: &str) -> String {
    if instructions.contains(CONTEXT_PLACEHOLDER) {
        instructions.replace(CONTEXT_PLACEHOLDER, context)
    } else if context.is_empty() {
        instructions.to_string()
    } else {
        format!("{instructions}\n\nContext:\n{context}")
    }
}

/// The longest character prefix of `text` accepted by `fits`.
fn longest_fitting_prefix(text: &str, fits: impl Fn(&str) -> bool) -> &str {
    let ends: Vec<usize> =
        text.char_indices().map(|(i, _)| i).skip(1).chain([text.len()]).collect();
    // `fits` is monotone in prefix length, so binary search for the last fit.
    let count = ends.partition_point(|&end| fits(&text[..end]));
    if count == 0 { "" } else { &text[..ends[count - 1]] }
}
