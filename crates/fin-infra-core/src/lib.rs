//! fin-infra Core Library
//!
//! Recurring transaction detection for fin-infra:
//! - Merchant normalization (rule dictionary, cache, optional LLM fallback)
//! - Fixed-amount pattern detection with cadence classification
//! - Variable/seasonal detection through a cost-bounded LLM gateway
//! - Daily/monthly LLM budget tracking
//! - Pluggable LLM backends (OpenAI-compatible HTTP, deterministic mock)
//! - Prompt library with user overrides
//! - Accuracy benchmark and cost simulation harnesses

pub mod benchmark;
pub mod budget;
pub mod cache;
pub mod config;
pub mod detectors;
pub mod error;
pub mod gateway;
pub mod import;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod prompts;
pub mod recurring;
pub mod simulation;

/// Test utilities including mock OpenAI-compatible server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use benchmark::{BenchmarkMode, BenchmarkResult, LabeledCase, TargetCheck};
pub use budget::{BudgetStatus, BudgetTracker};
pub use cache::{InMemoryCache, MerchantCache, NoopCache, SqliteCache};
pub use config::{MerchantRule, RecurringConfig};
pub use detectors::{detect_fixed, detect_variable_heuristic, VariableDetector};
pub use error::{Error, Result};
pub use gateway::{CostGateway, LlmOutcome};
pub use llm::{LlmBackend, LlmClient, MockBackend, OpenAICompatibleBackend};
pub use models::{
    AmountType, Cadence, CanonicalMerchant, DetectionStatus, ExpectedAmount, MerchantGroup,
    NormalizationSource, PatternSource, RecurringPattern, Transaction, VariableRecurringPattern,
};
pub use normalize::{MerchantNormalizer, NormalizerStats};
pub use prompts::{Prompt, PromptId, PromptInfo, PromptLibrary};
pub use recurring::RecurringDetector;
pub use simulation::{CostReport, SimulationOptions};
