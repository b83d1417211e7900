//! Request/response types shared by all LLM backends

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// JSON Schema the response must conform to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

impl OutputSchema {
    /// Schema generated from a Rust type
    pub fn of<T: JsonSchema>(name: &str) -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        Self {
            name: name.to_string(),
            schema,
        }
    }
}

/// A structured chat request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub output_schema: OutputSchema,
    pub temperature: f32,
    pub provider: String,
    pub model: String,
}

impl ChatRequest {
    /// Content of the first user message (empty if none)
    pub fn user_content(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// Structured output from a backend
#[derive(Debug, Clone)]
pub struct StructuredResponse {
    /// Parsed JSON object
    pub structured: Value,
    /// Raw model text, kept for logging
    pub raw: String,
}

/// A type the LLM can be asked to produce
///
/// `validate` runs after deserialization; a failure is treated the same as a
/// malformed response.
pub trait StructuredOutput: DeserializeOwned + JsonSchema + Send {
    /// Name sent as the json_schema name
    const SCHEMA_NAME: &'static str;

    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Normalization answer from the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MerchantNormalization {
    /// Canonical brand name, lowercase
    pub canonical_name: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl StructuredOutput for MerchantNormalization {
    const SCHEMA_NAME: &'static str = "merchant_normalization";

    fn validate(&self) -> Result<()> {
        check_confidence(self.confidence)?;
        if self.canonical_name.trim().is_empty() {
            return Err(crate::error::Error::InvalidData(
                "empty canonical_name".into(),
            ));
        }
        Ok(())
    }
}

/// Variable/seasonal recurring classification from the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VariableRecurringResponse {
    pub is_recurring: bool,
    /// weekly, monthly, quarterly, annual, or null
    pub cadence: Option<String>,
    /// Typical range, e.g. "$45-$65"
    pub expected_range: Option<String>,
    pub reasoning: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl StructuredOutput for VariableRecurringResponse {
    const SCHEMA_NAME: &'static str = "variable_recurring_pattern";

    fn validate(&self) -> Result<()> {
        check_confidence(self.confidence)
    }
}

fn check_confidence(confidence: f64) -> Result<()> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(crate::error::Error::InvalidData(format!(
            "confidence {} outside [0, 1]",
            confidence
        )))
    }
}
