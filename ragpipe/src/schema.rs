//! The structured response contract and its validator.
//!
//! Generator output is never trusted as-is: [`OutputSchema::validate`] parses
//! the raw text, checks it against a JSON Schema that allows exactly the
//! configured string fields, and only then produces a [`StructuredResponse`].

use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{RagError, Result};

/// The answer to a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuredResponse {
    /// The answer to the question.
    pub answer: String,
    /// A short creative piece related to the answer.
    pub poem: String,
    /// A question the user might ask next.
    pub followup_question: String,
}

impl StructuredResponse {
    /// Serialize to a JSON object with exactly the three response keys.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One required string field of the output schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// JSON key.
    pub name: String,
    /// What the generator should put in the field.
    pub description: String,
}

/// The fields a generator must return, plus a compiled validator for them.
pub struct OutputSchema {
    fields: Vec<SchemaField>,
    json_schema: Value,
    validator: Validator,
}

impl std::fmt::Debug for OutputSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSchema").field("fields", &self.fields).finish_non_exhaustive()
    }
}

impl OutputSchema {
    /// The schema for [`StructuredResponse`].
    pub fn structured_response() -> Result<Self> {
        let fields = vec![
            SchemaField {
                name: "answer".to_string(),
                description: "The answer to the user's question".to_string(),
            },
            SchemaField {
                name: "poem".to_string(),
                description: "A short poem related to the answer".to_string(),
            },
            SchemaField {
                name: "followup_question".to_string(),
                description: "A follow-up question the user might ask next".to_string(),
            },
        ];
        Self::new(fields)
    }

    /// Build a schema requiring exactly `fields`, each a string.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `fields` is empty or contains
    /// duplicate names.
    pub fn new(fields: Vec<SchemaField>) -> Result<Self> {
        if fields.is_empty() {
            return Err(RagError::ConfigError("output schema needs at least one field".into()));
        }
        let mut properties = Map::new();
        for field in &fields {
            if properties.contains_key(&field.name) {
                return Err(RagError::ConfigError(format!(
                    "duplicate output schema field '{}'",
                    field.name
                )));
            }
            properties.insert(
                field.name.clone(),
                json!({ "type": "string", "description": field.description }),
            );
        }
        let required: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        let json_schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        });
        let validator = Validator::new(&json_schema)
            .map_err(|e| RagError::ConfigError(format!("invalid output schema: {e}")))?;

        Ok(Self { fields, json_schema, validator })
    }

    /// The required fields.
    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// The JSON Schema document, for generators that support constrained output.
    pub fn json_schema(&self) -> &Value {
        &self.json_schema
    }

    /// Check a JSON value against the schema.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SchemaValidation`] describing the first violation.
    pub fn check(&self, value: &Value) -> Result<()> {
        if let Err(error) = self.validator.validate(value) {
            return Err(RagError::SchemaValidation(format!("{error}")));
        }
        Ok(())
    }

    /// Parse raw generator output and validate it.
    ///
    /// Accepts a bare JSON object or one wrapped in a fenced code block.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SchemaValidation`] if no JSON object can be
    /// extracted, a field is missing, a field is not a string, or an
    /// unexpected field is present.
    pub fn validate<T: for<'de> Deserialize<'de>>(&self, raw: &str) -> Result<T> {
        let value = extract_json(raw).ok_or_else(|| {
            RagError::SchemaValidation("generator output does not contain a JSON object".into())
        })?;
        self.check(&value)?;
        serde_json::from_value(value).map_err(|e| {
            RagError::SchemaValidation(format!(
                "generator output does not match response type: {e}"
            ))
        })
    }
}

/// Parse `text` as JSON, or pull JSON out of a markdown code fence.
fn extract_json(text: &str) -> Option<Value> {
    if let Ok(json) = serde_json::from_str(text.trim()) {
        return Some(json);
    }
    let json_str = extract_json_from_markdown(text)?;
    serde_json::from_str(&json_str).ok()
}

fn extract_json_from_markdown(text: &str) -> Option<String> {
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];
    let end_marker = "```";

    for start in start_markers {
        if let Some(start_idx) = text.find(start) {
            let content_start = start_idx + start.len();
            if let Some(end_idx) = text[content_start..].find(end_marker) {
                return Some(text[content_start..content_start + end_idx].trim().to_string());
            }
        }
    }
    None
}
