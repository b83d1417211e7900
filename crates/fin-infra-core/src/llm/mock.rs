//! Mock backend for testing
//!
//! Returns predictable structured responses without a running LLM. Clones
//! share state, so a test can keep a handle, pass a clone into the pipeline,
//! and then inspect how many calls were made and what was sent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Error, Result};

use super::types::{ChatRequest, StructuredResponse};
use super::LlmBackend;

#[derive(Default)]
struct MockState {
    /// Fixed responses keyed by schema name
    responses: HashMap<String, Value>,
    /// Fixed errors keyed by schema name
    errors: HashMap<String, String>,
    /// Fail every call with this message
    fail_all: Option<String>,
    /// Every request received, in order
    requests: Vec<ChatRequest>,
}

/// Mock LLM backend for testing
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    model: String,
    /// Whether health_check should return true
    pub healthy: bool,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a healthy mock with keyword-based default responses
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            model: "mock".to_string(),
            healthy: true,
        }
    }

    /// Create a mock whose every call fails
    pub fn failing(message: &str) -> Self {
        let mock = Self::new();
        mock.fail_all(message);
        mock
    }

    /// Create a new instance with a different model (state stays shared)
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Always answer `schema_name` requests with `response`
    pub fn set_response(&self, schema_name: &str, response: Value) {
        self.state()
            .responses
            .insert(schema_name.to_string(), response);
    }

    /// Always fail `schema_name` requests with `message`
    pub fn set_error(&self, schema_name: &str, message: &str) {
        self.state()
            .errors
            .insert(schema_name.to_string(), message.to_string());
    }

    /// Fail every request
    pub fn fail_all(&self, message: &str) {
        self.state().fail_all = Some(message.to_string());
    }

    /// Total calls received
    pub fn call_count(&self) -> usize {
        self.state().requests.len()
    }

    /// Calls received for one schema
    pub fn call_count_for(&self, schema_name: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|r| r.output_schema.name == schema_name)
            .count()
    }

    /// Copy of every request received
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.state().requests.clone()
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn achat(&self, request: &ChatRequest) -> Result<StructuredResponse> {
        let schema = request.output_schema.name.clone();
        let scripted = {
            let mut state = self.state();
            state.requests.push(request.clone());

            if let Some(ref message) = state.fail_all {
                return Err(Error::Llm(message.clone()));
            }
            if let Some(message) = state.errors.get(&schema) {
                return Err(Error::Llm(message.clone()));
            }
            state.responses.get(&schema).cloned()
        };

        let structured = match scripted {
            Some(value) => value,
            None => match schema.as_str() {
                "merchant_normalization" => default_normalization(request.user_content()),
                "variable_recurring_pattern" => default_variable(request.user_content()),
                other => return Err(Error::Llm(format!("mock has no response for {}", other))),
            },
        };

        Ok(StructuredResponse {
            raw: structured.to_string(),
            structured,
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Echo back the cleaned merchant from the prompt's `Cleaned: "..."` line
pub(crate) fn default_normalization(prompt: &str) -> Value {
    let cleaned = quoted_after(prompt, "Cleaned: ")
        .or_else(|| quoted_after(prompt, "Raw merchant: "))
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| "unknown".to_string());

    json!({ "canonical_name": cleaned, "confidence": 0.85 })
}

/// Keyword rules: utilities and carriers recur monthly, everything else does not
pub(crate) fn default_variable(prompt: &str) -> Value {
    let merchant = prompt
        .lines()
        .find_map(|l| l.strip_prefix("Merchant: "))
        .unwrap_or_default()
        .to_lowercase();

    let recurring = [
        "electric", "utility", "gas", "water", "power", "energy", "mobile", "wireless",
        "internet", "comcast", "verizon", "at&t",
    ]
    .iter()
    .any(|k| merchant.contains(k));

    if recurring {
        json!({
            "is_recurring": true,
            "cadence": "monthly",
            "expected_range": null,
            "reasoning": format!("{} is a usage-billed service charged every month", merchant),
            "confidence": 0.85,
        })
    } else {
        json!({
            "is_recurring": false,
            "cadence": null,
            "expected_range": null,
            "reasoning": "Amounts and dates look like discretionary spending",
            "confidence": 0.8,
        })
    }
}

fn quoted_after<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let start = text.find(prefix)? + prefix.len();
    let rest = text[start..].strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(&rest[..end])
}
