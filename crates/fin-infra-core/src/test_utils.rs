//! Test utilities for fin-infra-core
//!
//! This module provides a mock OpenAI-compatible server so the HTTP backend
//! can be exercised end to end in integration tests and local development
//! (`OPENAI_COMPATIBLE_HOST=<url>` with provider `openai_compatible`).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::llm::mock::{default_normalization, default_variable};

#[derive(Default)]
struct ServerState {
    /// Answer every chat request with 503
    fail: bool,
    chat_calls: AtomicUsize,
}

/// Mock OpenAI-compatible server for testing and development
pub struct MockLlmServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockLlmServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::spawn(ServerState::default()).await
    }

    /// Start a server whose chat endpoint always returns 503
    pub async fn start_failing() -> Self {
        Self::spawn(ServerState {
            fail: true,
            ..ServerState::default()
        })
        .await
    }

    async fn spawn(state: ServerState) -> Self {
        let state = Arc::new(state);
        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server (without the `/v1` suffix)
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Chat completion requests received so far
    pub fn chat_calls(&self) -> usize {
        self.state.chat_calls.load(Ordering::SeqCst)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockLlmServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Model listing (health check)
async fn handle_models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{"id": "mock-model", "object": "model", "owned_by": "fin-infra"}],
    }))
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    model: String,
    messages: Vec<ChatBodyMessage>,
    #[serde(default)]
    response_format: Value,
}

#[derive(Debug, Deserialize)]
struct ChatBodyMessage {
    role: String,
    content: String,
}

/// Chat completions, answered by schema name with the same rules as `MockBackend`
async fn handle_chat(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ChatBody>,
) -> Response {
    state.chat_calls.fetch_add(1, Ordering::SeqCst);
    if state.fail {
        return (StatusCode::SERVICE_UNAVAILABLE, "model overloaded").into_response();
    }

    let user = body
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    let content = match body.response_format["json_schema"]["name"].as_str() {
        Some("merchant_normalization") => default_normalization(user),
        Some("variable_recurring_pattern") => default_variable(user),
        _ => return (StatusCode::BAD_REQUEST, "unknown response schema").into_response(),
    };

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": body.model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content.to_string()},
            "finish_reason": "stop",
        }],
    }))
    .into_response()
}
