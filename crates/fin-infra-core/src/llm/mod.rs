//! Pluggable LLM backend abstraction
//!
//! The detectors never talk to a provider directly. They build a
//! `ChatRequest` (messages + JSON schema + temperature) and hand it to an
//! `LlmBackend`, which returns the structured JSON object.
//!
//! # Architecture
//!
//! - `LlmBackend` trait: one structured-chat method plus health/identity
//! - `LlmClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `LLM_BACKEND`: `mock` forces the mock backend; anything else uses the
//!   configured provider
//! - Provider credentials: see `openai_compatible`

pub(crate) mod mock;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use mock::MockBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use async_trait::async_trait;

use crate::config::RecurringConfig;
use crate::error::Result;

/// Trait defining the interface for all LLM backends
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Send a chat request and return the structured JSON object
    async fn achat(&self, request: &ChatRequest) -> Result<StructuredResponse>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Provider name (for logging)
    fn provider(&self) -> &str;

    /// Model name (for logging)
    fn model(&self) -> &str;
}

/// Concrete LLM client enum
#[derive(Clone)]
pub enum LlmClient {
    /// Gemini, OpenAI, Ollama, or any OpenAI-compatible server
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl LlmClient {
    /// Build the client for the configured provider/model
    ///
    /// `LLM_BACKEND=mock` short-circuits to the mock backend so the CLI can
    /// exercise the LLM path without credentials.
    pub fn from_config(config: &RecurringConfig) -> Result<Self> {
        let backend = std::env::var("LLM_BACKEND").unwrap_or_default();
        if backend.eq_ignore_ascii_case("mock") {
            return Ok(Self::mock());
        }

        OpenAICompatibleBackend::for_provider(
            &config.llm_provider,
            &config.llm_model,
            config.llm_timeout,
        )
        .map(LlmClient::OpenAICompatible)
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        LlmClient::Mock(MockBackend::new())
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            LlmClient::OpenAICompatible(b) => LlmClient::OpenAICompatible(b.with_model(model)),
            LlmClient::Mock(b) => LlmClient::Mock(b.with_model(model)),
        }
    }
}

impl From<MockBackend> for LlmClient {
    fn from(mock: MockBackend) -> Self {
        LlmClient::Mock(mock)
    }
}

// Implement LlmBackend for LlmClient by delegating to the inner backend
#[async_trait]
impl LlmBackend for LlmClient {
    async fn achat(&self, request: &ChatRequest) -> Result<StructuredResponse> {
        match self {
            LlmClient::OpenAICompatible(b) => b.achat(request).await,
            LlmClient::Mock(b) => b.achat(request).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            LlmClient::OpenAICompatible(b) => b.health_check().await,
            LlmClient::Mock(b) => b.health_check().await,
        }
    }

    fn provider(&self) -> &str {
        match self {
            LlmClient::OpenAICompatible(b) => b.provider(),
            LlmClient::Mock(b) => b.provider(),
        }
    }

    fn model(&self) -> &str {
        match self {
            LlmClient::OpenAICompatible(b) => b.model(),
            LlmClient::Mock(b) => b.model(),
        }
    }
}
