//! Cost-bounded access to the LLM
//!
//! Every paid call goes through `CostGateway::chat_structured`:
//! 1. If the shared budget is exceeded, return `BudgetExceeded` without calling
//! 2. Otherwise send the request at temperature 0
//! 3. On a valid response, record the per-call cost and return it
//! 4. Any failure (transport, malformed JSON, failed validation) is returned
//!    as `Failed` for the caller to degrade on

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::budget::{BudgetStatus, BudgetTracker};
use crate::config::RecurringConfig;
use crate::error::Error;
use crate::llm::{ChatMessage, ChatRequest, LlmBackend, LlmClient, OutputSchema, StructuredOutput};

/// Sampling temperature for every classification call
pub const TEMPERATURE: f32 = 0.0;

/// Result of a gated LLM call
#[derive(Debug, Clone, PartialEq)]
pub enum LlmOutcome<T> {
    Completed(T),
    /// No call was made
    BudgetExceeded,
    /// The call was made (or attempted) and did not produce a usable answer
    Failed(String),
}

/// LLM client paired with the budget that pays for it
pub struct CostGateway {
    client: LlmClient,
    budget: Arc<BudgetTracker>,
    provider: String,
    model: String,
}

impl CostGateway {
    pub fn new(client: LlmClient, budget: Arc<BudgetTracker>, provider: &str, model: &str) -> Self {
        Self {
            client,
            budget,
            provider: provider.to_string(),
            model: model.to_string(),
        }
    }

    /// Gateway using the configured provider/model names
    pub fn from_config(
        client: LlmClient,
        budget: Arc<BudgetTracker>,
        config: &RecurringConfig,
    ) -> Self {
        Self::new(client, budget, &config.llm_provider, &config.llm_model)
    }

    pub fn budget(&self) -> &Arc<BudgetTracker> {
        &self.budget
    }

    pub fn client(&self) -> &LlmClient {
        &self.client
    }

    pub fn is_exceeded(&self) -> bool {
        self.budget.is_exceeded()
    }

    pub fn get_budget_status(&self) -> BudgetStatus {
        self.budget.get_budget_status()
    }

    /// Ask for a `T`, paying `cost` if (and only if) a valid `T` comes back
    pub async fn chat_structured<T: StructuredOutput>(
        &self,
        messages: Vec<ChatMessage>,
        cost: Decimal,
    ) -> LlmOutcome<T> {
        if self.budget.is_exceeded() {
            debug!(schema = T::SCHEMA_NAME, "Budget exceeded, skipping LLM call");
            return LlmOutcome::BudgetExceeded;
        }

        let request = ChatRequest {
            messages,
            output_schema: OutputSchema::of::<T>(T::SCHEMA_NAME),
            temperature: TEMPERATURE,
            provider: self.provider.clone(),
            model: self.model.clone(),
        };

        let response = match self.client.achat(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(schema = T::SCHEMA_NAME, error = %e, "LLM call failed");
                let reason = match e {
                    Error::Llm(message) => message,
                    other => other.to_string(),
                };
                return LlmOutcome::Failed(reason);
            }
        };

        let parsed = serde_json::from_value::<T>(response.structured)
            .map_err(|e| format!("malformed {} response: {}", T::SCHEMA_NAME, e))
            .and_then(|value| {
                value
                    .validate()
                    .map(|_| value)
                    .map_err(|e| format!("invalid {} response: {}", T::SCHEMA_NAME, e))
            });

        match parsed {
            Ok(value) => {
                self.budget.record_cost(cost);
                LlmOutcome::Completed(value)
            }
            Err(reason) => {
                warn!(schema = T::SCHEMA_NAME, raw = %response.raw, "{}", reason);
                LlmOutcome::Failed(reason)
            }
        }
    }
}
