//! Variable/seasonal recurring detection
//!
//! Groups with a regular cadence but a varying amount (utility bills,
//! phone plans with overages, seasonal heating) are classified here, either
//! by the LLM through the cost gateway or by a deterministic heuristic.
//!
//! `VariableDetector::detect` never fails on LLM trouble. It degrades to a
//! not-recurring result whose status and confidence record why:
//! - no LLM configured: `LlmDisabled`, 0.5
//! - budget exceeded: `BudgetExceeded`, 0.5 (no call made)
//! - call or validation failure: `LlmError`, 0.3

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::{
    classify_cadence, closeness, coefficient_of_variation, mean, median, regular_cadence,
};
use crate::config::RecurringConfig;
use crate::error::{Error, Result};
use crate::gateway::{CostGateway, LlmOutcome};
use crate::llm::{ChatMessage, VariableRecurringResponse};
use crate::models::{
    AmountType, Cadence, DetectionStatus, ExpectedAmount, MerchantGroup, PatternSource,
    RecurringPattern, Transaction, VariableRecurringPattern,
};
use crate::prompts::{Prompt, PromptId, PromptLibrary};

/// Confidence when no LLM answer could be requested
const UNAVAILABLE_CONFIDENCE: f64 = 0.5;
/// Confidence when the LLM call failed
const ERROR_CONFIDENCE: f64 = 0.3;
/// Ceiling for heuristic (non-LLM) variable patterns
const HEURISTIC_CONFIDENCE_CAP: f64 = 0.75;

/// LLM-backed classifier for variable-amount groups
pub struct VariableDetector {
    gateway: Option<Arc<CostGateway>>,
    prompt: Prompt,
    cost_per_call: Decimal,
}

impl VariableDetector {
    /// Detector with no LLM; every `detect` call returns `LlmDisabled`
    pub fn new(config: &RecurringConfig) -> Result<Self> {
        let prompt = PromptLibrary::new()
            .get(PromptId::DetectVariableRecurring)?
            .clone();
        Ok(Self {
            gateway: None,
            prompt,
            cost_per_call: config.cost_per_detection,
        })
    }

    pub fn with_gateway(mut self, gateway: Arc<CostGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Ask whether `transactions` from `merchant` form a variable recurring charge
    pub async fn detect(
        &self,
        merchant: &str,
        transactions: &[Transaction],
    ) -> Result<VariableRecurringPattern> {
        if transactions.is_empty() {
            return Err(Error::InvalidInput("transactions cannot be empty".into()));
        }

        let Some(ref gateway) = self.gateway else {
            return Ok(VariableRecurringPattern::fallback(
                DetectionStatus::LlmDisabled,
                UNAVAILABLE_CONFIDENCE,
                "LLM unavailable: LLM disabled".to_string(),
            ));
        };

        let messages = self.build_messages(merchant, transactions);
        match gateway
            .chat_structured::<VariableRecurringResponse>(messages, self.cost_per_call)
            .await
        {
            LlmOutcome::Completed(response) => {
                debug!(
                    merchant = %merchant,
                    is_recurring = response.is_recurring,
                    confidence = response.confidence,
                    "Variable detection answered"
                );
                Ok(VariableRecurringPattern {
                    is_recurring: response.is_recurring,
                    cadence: response.cadence,
                    expected_range: response.expected_range,
                    reasoning: response.reasoning,
                    confidence: response.confidence,
                    status: DetectionStatus::Detected,
                })
            }
            LlmOutcome::BudgetExceeded => {
                info!(merchant = %merchant, "LLM budget exceeded, skipping variable detection");
                Ok(VariableRecurringPattern::fallback(
                    DetectionStatus::BudgetExceeded,
                    UNAVAILABLE_CONFIDENCE,
                    "LLM unavailable: budget exceeded".to_string(),
                ))
            }
            LlmOutcome::Failed(reason) => Ok(VariableRecurringPattern::fallback(
                DetectionStatus::LlmError,
                ERROR_CONFIDENCE,
                format!("LLM error: {}", reason),
            )),
        }
    }

    fn build_messages(&self, merchant: &str, transactions: &[Transaction]) -> Vec<ChatMessage> {
        let mut sorted: Vec<&Transaction> = transactions.iter().collect();
        sorted.sort_by_key(|t| t.date);

        let lines = sorted
            .iter()
            .map(|t| format!("- {}: ${:.2}", t.date, t.amount.abs()))
            .collect::<Vec<_>>()
            .join("\n");
        let count = sorted.len().to_string();

        let vars = HashMap::from([
            ("merchant", merchant),
            ("count", count.as_str()),
            ("transactions", lines.as_str()),
        ]);

        vec![
            ChatMessage::system(self.prompt.system()),
            ChatMessage::user(self.prompt.render_user(&vars)),
        ]
    }
}

/// Turn a positive LLM answer into a pattern over the group
///
/// Returns None unless the answer is an actual `Detected` + recurring result.
pub fn to_pattern(
    group: &MerchantGroup,
    detection: &VariableRecurringPattern,
) -> Option<RecurringPattern> {
    if detection.status != DetectionStatus::Detected || !detection.is_recurring {
        return None;
    }

    let cadence = detection
        .cadence
        .as_deref()
        .map(Cadence::from_loose)
        .filter(|c| *c != Cadence::Unknown)
        .unwrap_or_else(|| inferred_cadence(group));

    Some(RecurringPattern::from_group(
        group,
        cadence,
        AmountType::Variable,
        observed_range(group, detection.expected_range.clone()),
        detection.confidence,
        detection.reasoning.clone(),
        PatternSource::Llm,
    ))
}

/// Deterministic variable check: regular cadence with a bounded amount spread
pub fn detect_variable_heuristic(
    group: &MerchantGroup,
    config: &RecurringConfig,
) -> Option<RecurringPattern> {
    if group.len() < config.min_transactions {
        return None;
    }

    let (cadence, gap_cv) = regular_cadence(&group.day_gaps(), config.max_interval_cv)?;

    let values: Vec<f64> = group.amounts().iter().filter_map(|a| a.to_f64()).collect();
    if mean(&values) <= 0.0 {
        return None;
    }
    let amount_cv = coefficient_of_variation(&values);
    if amount_cv > config.variable_max_amount_cv {
        debug!(
            merchant = %group.merchant,
            amount_cv,
            "Amount spread too wide for a variable pattern"
        );
        return None;
    }

    let gap_score = closeness(gap_cv, config.max_interval_cv);
    let amount_score = closeness(amount_cv, config.variable_max_amount_cv);
    let confidence = HEURISTIC_CONFIDENCE_CAP * (gap_score + amount_score) / 2.0;

    let expected = observed_range(group, None);
    let reasoning = format!(
        "{} {} charges between {} (amount CV {:.2})",
        group.len(),
        cadence,
        expected,
        amount_cv
    );

    Some(RecurringPattern::from_group(
        group,
        cadence,
        AmountType::Variable,
        expected,
        confidence,
        reasoning,
        PatternSource::Heuristic,
    ))
}

fn observed_range(group: &MerchantGroup, hint: Option<String>) -> ExpectedAmount {
    let amounts = group.amounts();
    let min = amounts.iter().copied().min().unwrap_or_default();
    let max = amounts.iter().copied().max().unwrap_or_default();
    ExpectedAmount::Range { min, max, hint }
}

fn inferred_cadence(group: &MerchantGroup) -> Cadence {
    let gaps: Vec<f64> = group.day_gaps().iter().map(|g| *g as f64).collect();
    if gaps.is_empty() {
        return Cadence::Unknown;
    }
    classify_cadence(median(&gaps)).unwrap_or(Cadence::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetTracker;
    use crate::llm::MockBackend;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn txns(merchant: &str, rows: &[(Decimal, &str)]) -> Vec<Transaction> {
        rows.iter()
            .enumerate()
            .map(|(i, (amount, date))| {
                Transaction::new(
                    &format!("txn_{}", i),
                    merchant,
                    *amount,
                    NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                )
            })
            .collect()
    }

    fn electric() -> Vec<Transaction> {
        txns(
            "City Electric",
            &[
                (dec!(45.50), "2024-01-15"),
                (dec!(52.30), "2024-02-15"),
                (dec!(48.75), "2024-03-15"),
                (dec!(54.20), "2024-04-15"),
            ],
        )
    }

    fn detector(mock: &MockBackend, budget: Arc<BudgetTracker>) -> VariableDetector {
        let config = RecurringConfig::default().with_llm(true);
        let gateway = Arc::new(CostGateway::from_config(mock.clone().into(), budget, &config));
        VariableDetector::new(&config).unwrap().with_gateway(gateway)
    }

    fn budget() -> Arc<BudgetTracker> {
        Arc::new(BudgetTracker::new(dec!(0.10), dec!(2.00)))
    }

    #[tokio::test]
    async fn test_seasonal_utility_detected() {
        let mock = MockBackend::new();
        mock.set_response(
            "variable_recurring_pattern",
            json!({
                "is_recurring": true,
                "cadence": "monthly",
                "expected_range": "$45-$55",
                "reasoning": "Seasonal winter heating variation",
                "confidence": 0.88,
            }),
        );
        let detector = detector(&mock, budget());

        let result = detector.detect("City Electric", &electric()).await.unwrap();
        assert!(result.is_recurring);
        assert_eq!(result.cadence.as_deref(), Some("monthly"));
        assert_eq!(result.expected_range.as_deref(), Some("$45-$55"));
        assert_eq!(result.reasoning, "Seasonal winter heating variation");
        assert_eq!(result.confidence, 0.88);
        assert_eq!(result.status, DetectionStatus::Detected);

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.provider, "google");
        assert_eq!(request.model, "gemini-2.0-flash-exp");
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.output_schema.name, "variable_recurring_pattern");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].role, "user");
        assert!(request.messages[1].content.contains("City Electric"));
        assert!(request.messages[1].content.contains("$45.50"));
        assert!(request.messages[1].content.contains("$52.30"));
    }

    #[tokio::test]
    async fn test_prompt_lists_dates_in_order() {
        let mock = MockBackend::new();
        let detector = detector(&mock, budget());
        let unordered = txns(
            "Gas Company",
            &[
                (dec!(45.00), "2024-06-15"),
                (dec!(120.00), "2024-12-15"),
                (dec!(115.00), "2024-01-15"),
            ],
        );

        detector.detect("Gas Company", &unordered).await.unwrap();
        let content = mock.requests()[0].messages[1].content.clone();
        let jan = content.find("2024-01-15").unwrap();
        let jun = content.find("2024-06-15").unwrap();
        let dec_ = content.find("2024-12-15").unwrap();
        assert!(jan < jun && jun < dec_);
        assert!(content.contains("(3)"));
    }

    #[tokio::test]
    async fn test_empty_transactions_is_error() {
        let detector = detector(&MockBackend::new(), budget());
        let err = detector.detect("Test", &[]).await.unwrap_err();
        assert!(err.to_string().contains("transactions cannot be empty"));
    }

    #[tokio::test]
    async fn test_budget_tracking() {
        let mock = MockBackend::new();
        let budget = budget();
        let detector = detector(&mock, budget.clone());
        let one = txns("Test", &[(dec!(50.00), "2024-01-15")]);

        detector.detect("Test", &one).await.unwrap();
        let status = budget.get_budget_status();
        assert_eq!(status.daily_cost, dec!(0.0001));
        assert_eq!(status.monthly_cost, dec!(0.0001));

        detector.detect("Test", &one).await.unwrap();
        let status = budget.get_budget_status();
        assert_eq!(status.daily_cost, dec!(0.0002));
        assert_eq!(status.monthly_cost, dec!(0.0002));
    }

    #[tokio::test]
    async fn test_budget_exceeded_returns_not_recurring() {
        let mock = MockBackend::new();
        let budget = budget();
        budget.record_cost(dec!(0.11));
        let detector = detector(&mock, budget);

        let result = detector.detect("City Electric", &electric()).await.unwrap();
        assert!(!result.is_recurring);
        assert_eq!(result.confidence, 0.5);
        assert!(result.reasoning.contains("budget exceeded"));
        assert_eq!(result.status, DetectionStatus::BudgetExceeded);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_llm_error_degrades() {
        let mock = MockBackend::failing("API timeout");
        let budget = budget();
        let detector = detector(&mock, budget.clone());

        let result = detector.detect("City Electric", &electric()).await.unwrap();
        assert!(!result.is_recurring);
        assert_eq!(result.confidence, 0.3);
        assert!(result.reasoning.contains("LLM error"));
        assert!(result.reasoning.contains("API timeout"));
        assert_eq!(result.status, DetectionStatus::LlmError);
        assert_eq!(budget.get_budget_status().daily_cost, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_error() {
        let mock = MockBackend::new();
        mock.set_response(
            "variable_recurring_pattern",
            json!({
                "is_recurring": true,
                "cadence": "monthly",
                "expected_range": "$50",
                "reasoning": "Test",
                "confidence": 1.5,
            }),
        );
        let detector = detector(&mock, budget());

        let result = detector.detect("Test", &electric()).await.unwrap();
        assert_eq!(result.status, DetectionStatus::LlmError);
        assert_eq!(result.confidence, 0.3);
    }

    #[tokio::test]
    async fn test_without_gateway_is_disabled() {
        let detector = VariableDetector::new(&RecurringConfig::default()).unwrap();
        let result = detector.detect("City Electric", &electric()).await.unwrap();
        assert!(!result.is_recurring);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.status, DetectionStatus::LlmDisabled);
    }

    #[test]
    fn test_to_pattern_uses_observed_range() {
        let group = MerchantGroup::new("city electric", electric());
        let detection = VariableRecurringPattern {
            is_recurring: true,
            cadence: Some("Monthly".into()),
            expected_range: Some("$45-$55".into()),
            reasoning: "seasonal".into(),
            confidence: 0.88,
            status: DetectionStatus::Detected,
        };

        let pattern = to_pattern(&group, &detection).unwrap();
        assert_eq!(pattern.cadence, Cadence::Monthly);
        assert_eq!(pattern.amount_type, AmountType::Variable);
        assert_eq!(pattern.source, PatternSource::Llm);
        assert_eq!(
            pattern.expected_amount,
            ExpectedAmount::Range {
                min: dec!(45.50),
                max: dec!(54.20),
                hint: Some("$45-$55".into()),
            }
        );
    }

    #[test]
    fn test_to_pattern_infers_missing_cadence() {
        let group = MerchantGroup::new("city electric", electric());
        let detection = VariableRecurringPattern {
            is_recurring: true,
            cadence: None,
            expected_range: None,
            reasoning: "usage billed".into(),
            confidence: 0.8,
            status: DetectionStatus::Detected,
        };
        assert_eq!(to_pattern(&group, &detection).unwrap().cadence, Cadence::Monthly);
    }

    #[test]
    fn test_to_pattern_rejects_fallbacks() {
        let group = MerchantGroup::new("city electric", electric());
        let fallback = VariableRecurringPattern::fallback(
            DetectionStatus::BudgetExceeded,
            0.5,
            "LLM unavailable: budget exceeded".into(),
        );
        assert!(to_pattern(&group, &fallback).is_none());
    }

    #[test]
    fn test_heuristic_accepts_utility() {
        let group = MerchantGroup::new("city electric", electric());
        let pattern = detect_variable_heuristic(&group, &RecurringConfig::default()).unwrap();
        assert_eq!(pattern.cadence, Cadence::Monthly);
        assert_eq!(pattern.amount_type, AmountType::Variable);
        assert_eq!(pattern.source, PatternSource::Heuristic);
        assert!(pattern.confidence <= 0.75);
    }

    #[test]
    fn test_heuristic_rejects_random_spend() {
        let group = MerchantGroup::new(
            "random store",
            txns(
                "Random Store",
                &[
                    (dec!(25.00), "2024-01-15"),
                    (dec!(150.00), "2024-02-15"),
                    (dec!(40.00), "2024-03-15"),
                    (dec!(200.00), "2024-04-15"),
                ],
            ),
        );
        assert!(detect_variable_heuristic(&group, &RecurringConfig::default()).is_none());
    }

    #[test]
    fn test_heuristic_rejects_zero_amounts() {
        let group = MerchantGroup::new(
            "free trial svc",
            txns(
                "FREE TRIAL SVC",
                &[
                    (dec!(0.00), "2024-01-08"),
                    (dec!(0.00), "2024-02-08"),
                    (dec!(0.00), "2024-03-08"),
                    (dec!(0.00), "2024-04-08"),
                ],
            ),
        );
        assert!(detect_variable_heuristic(&group, &RecurringConfig::default()).is_none());
    }
}
