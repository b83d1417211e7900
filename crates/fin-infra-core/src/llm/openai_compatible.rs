//! OpenAI-compatible chat completions backend
//!
//! One HTTP client covers every provider that speaks the OpenAI chat
//! completions API:
//! - Google Gemini (`https://generativelanguage.googleapis.com/v1beta/openai`)
//! - OpenAI (`https://api.openai.com/v1`)
//! - Ollama (`http://localhost:11434/v1`)
//! - Any other server via `OPENAI_COMPATIBLE_HOST`
//!
//! # Configuration
//!
//! Environment variables:
//! - `GOOGLE_API_KEY` (or `GEMINI_API_KEY`): required for the google provider
//! - `OPENAI_API_KEY`: required for the openai provider
//! - `OLLAMA_HOST`: Ollama server URL (default: http://localhost:11434)
//! - `OPENAI_COMPATIBLE_HOST`: server URL for the openai_compatible provider
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if that server requires one

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};

use super::parsing::extract_json_object;
use super::types::{ChatMessage, ChatRequest, StructuredResponse};
use super::LlmBackend;

const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_HOST: &str = "http://localhost:11434";

/// Backend for any OpenAI-compatible `/chat/completions` endpoint
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    provider: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAICompatibleBackend {
    /// Create a backend for an explicit base URL (which includes any `/v1`)
    pub fn new(provider: &str, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            api_key: None,
        })
    }

    /// Attach a bearer token
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    /// Resolve endpoint and credentials for a named provider from the environment
    pub fn for_provider(provider: &str, model: &str, timeout: Duration) -> Result<Self> {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        match provider.to_lowercase().as_str() {
            "google" | "gemini" => {
                let key = env("GOOGLE_API_KEY")
                    .or_else(|| env("GEMINI_API_KEY"))
                    .ok_or_else(|| Error::Config("GOOGLE_API_KEY is not set".into()))?;
                Ok(Self::new("google", GOOGLE_BASE_URL, model, timeout)?.with_api_key(&key))
            }
            "openai" => {
                let key = env("OPENAI_API_KEY")
                    .ok_or_else(|| Error::Config("OPENAI_API_KEY is not set".into()))?;
                Ok(Self::new("openai", OPENAI_BASE_URL, model, timeout)?.with_api_key(&key))
            }
            "ollama" => {
                let host = env("OLLAMA_HOST").unwrap_or_else(|| OLLAMA_DEFAULT_HOST.to_string());
                Self::new(
                    "ollama",
                    &format!("{}/v1", host.trim_end_matches('/')),
                    model,
                    timeout,
                )
            }
            "openai_compatible" | "vllm" | "localai" | "llamacpp" => {
                let host = env("OPENAI_COMPATIBLE_HOST").ok_or_else(|| {
                    Error::Config("OPENAI_COMPATIBLE_HOST is not set".into())
                })?;
                let backend = Self::new(
                    provider,
                    &format!("{}/v1", host.trim_end_matches('/')),
                    model,
                    timeout,
                )?;
                Ok(match env("OPENAI_COMPATIBLE_API_KEY") {
                    Some(key) => backend.with_api_key(&key),
                    None => backend,
                })
            }
            other => Err(Error::Config(format!("Unknown LLM provider: {}", other))),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref api_key) => builder.header("Authorization", format!("Bearer {}", api_key)),
            None => builder,
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAICompatibleBackend {
    async fn achat(&self, request: &ChatRequest) -> Result<StructuredResponse> {
        let body = ChatCompletionRequest {
            model: request.model.clone(),
            messages: &request.messages,
            temperature: request.temperature,
            response_format: json!({
                "type": "json_schema",
                "json_schema": {
                    "name": request.output_schema.name,
                    "schema": request.output_schema.schema,
                },
            }),
            stream: false,
        };

        debug!(
            provider = %self.provider,
            model = %request.model,
            schema = %request.output_schema.name,
            "Sending chat completion"
        );

        let response = self
            .authorize(
                self.http_client
                    .post(format!("{}/chat/completions", self.base_url))
                    .json(&body),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("{} API error {}: {}", self.provider, status, body)));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let raw = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Llm(format!("No response from {} API", self.provider)))?;

        let structured = extract_json_object(&raw)?;
        Ok(StructuredResponse { structured, raw })
    }

    async fn health_check(&self) -> bool {
        let request = self.authorize(self.http_client.get(format!("{}/models", self.base_url)));
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "LLM health check failed");
                false
            }
        }
    }

    fn provider(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: String,
    messages: &'a [ChatMessage],
    temperature: f32,
    response_format: Value,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}
