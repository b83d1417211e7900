//! Recurring detection orchestrator
//!
//! `RecurringDetector::detect_patterns` runs the full pipeline:
//! 1. Normalize each distinct raw merchant and group transactions by the
//!    canonical name
//! 2. Try fixed-amount detection on every group
//! 3. For groups that fail it but have enough history, ask the LLM (when the
//!    LLM layer is on for this request) or fall back to the heuristic
//! 4. Keep the positives, sorted by merchant
//!
//! Groups are independent and processed concurrently. The budget is the only
//! shared mutable state.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::budget::{BudgetStatus, BudgetTracker};
use crate::cache::MerchantCache;
use crate::config::RecurringConfig;
use crate::detectors::variable::to_pattern;
use crate::detectors::{detect_fixed, detect_variable_heuristic, VariableDetector};
use crate::error::{Error, Result};
use crate::gateway::CostGateway;
use crate::import::parse_transactions;
use crate::llm::LlmClient;
use crate::models::{MerchantGroup, RecurringPattern, Transaction};
use crate::normalize::{MerchantNormalizer, UNKNOWN_MERCHANT};

/// Multi-layer recurring charge detector
pub struct RecurringDetector {
    config: RecurringConfig,
    normalizer: MerchantNormalizer,
    variable: VariableDetector,
    gateway: Option<Arc<CostGateway>>,
}

impl RecurringDetector {
    /// Pattern-only detector (fixed detection + heuristic, no LLM)
    pub fn new(config: RecurringConfig, cache: Arc<dyn MerchantCache>) -> Result<Self> {
        config.validate()?;
        let normalizer = MerchantNormalizer::new(cache, &config)?;
        let variable = VariableDetector::new(&config)?;
        Ok(Self {
            config,
            normalizer,
            variable,
            gateway: None,
        })
    }

    /// Detector with the LLM layer enabled, paying from `budget`
    pub fn with_llm(
        config: RecurringConfig,
        cache: Arc<dyn MerchantCache>,
        client: LlmClient,
        budget: Arc<BudgetTracker>,
    ) -> Result<Self> {
        let config = config.with_llm(true);
        config.validate()?;
        let gateway = Arc::new(CostGateway::from_config(client, budget, &config));
        let normalizer = MerchantNormalizer::new(cache, &config)?.with_gateway(gateway.clone());
        let variable = VariableDetector::new(&config)?.with_gateway(gateway.clone());

        info!(
            provider = %config.llm_provider,
            model = %config.llm_model,
            ab_test_percentage = ?config.ab_test_llm_percentage,
            "LLM layer enabled"
        );

        Ok(Self {
            config,
            normalizer,
            variable,
            gateway: Some(gateway),
        })
    }

    /// Build the detector the configuration asks for
    ///
    /// With `enable_llm` the provider client and a budget sized from the
    /// configured limits are created here.
    pub fn from_config(config: RecurringConfig, cache: Arc<dyn MerchantCache>) -> Result<Self> {
        if config.enable_llm {
            let client = LlmClient::from_config(&config)?;
            let budget = Arc::new(BudgetTracker::from_config(&config));
            Self::with_llm(config, cache, client, budget)
        } else {
            Self::new(config, cache)
        }
    }

    pub fn config(&self) -> &RecurringConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &MerchantNormalizer {
        &self.normalizer
    }

    pub fn budget(&self) -> Option<&Arc<BudgetTracker>> {
        self.gateway.as_ref().map(|g| g.budget())
    }

    /// Budget snapshot, if the LLM layer is configured
    pub fn get_budget_status(&self) -> Option<BudgetStatus> {
        self.gateway.as_ref().map(|g| g.get_budget_status())
    }

    /// Whether a request for `subject` goes through the LLM layer
    ///
    /// With an A/B percentage configured, a subject is bucketed stably by the
    /// SHA-256 of its id; requests without a subject draw at random.
    pub fn llm_enabled_for(&self, subject: Option<&str>) -> bool {
        if !self.config.enable_llm || self.gateway.is_none() {
            return false;
        }
        let Some(percentage) = self.config.ab_test_llm_percentage else {
            return true;
        };

        let bucket = match subject {
            Some(subject) => {
                let digest = Sha256::digest(subject.as_bytes());
                let mut prefix = [0u8; 8];
                prefix.copy_from_slice(&digest[..8]);
                let bucket = (u64::from_be_bytes(prefix) % 10_000) as f64 / 100.0;
                debug!(subject = %hex::encode(&digest[..6]), bucket, "A/B bucket");
                bucket
            }
            None => rand::random::<f64>() * 100.0,
        };
        bucket < percentage
    }

    /// Detect recurring patterns in a transaction history
    ///
    /// Under an A/B split the history itself is bucketed (by its transaction
    /// ids), so repeated calls on the same input take the same path.
    pub async fn detect_patterns(&self, transactions: &[Transaction]) -> Result<Vec<RecurringPattern>> {
        self.detect_patterns_for(None, transactions).await
    }

    /// Detect recurring patterns for one user (A/B routing by `subject`)
    pub async fn detect_patterns_for(
        &self,
        subject: Option<&str>,
        transactions: &[Transaction],
    ) -> Result<Vec<RecurringPattern>> {
        let use_llm = match subject {
            Some(subject) => self.llm_enabled_for(Some(subject)),
            None => self.llm_enabled_for(Some(&history_key(transactions))),
        };
        let groups = self.group_by_merchant(transactions, use_llm).await?;
        let group_count = groups.len();

        let mut patterns: Vec<RecurringPattern> = stream::iter(groups)
            .map(|group| self.process_group(group, use_llm))
            .buffer_unordered(self.config.concurrency)
            .filter_map(|pattern| async move { pattern })
            .collect()
            .await;

        patterns.sort_by(|a, b| {
            a.merchant
                .cmp(&b.merchant)
                .then_with(|| a.last_seen.cmp(&b.last_seen))
        });

        info!(
            transactions = transactions.len(),
            groups = group_count,
            patterns = patterns.len(),
            llm = use_llm,
            "Recurring detection complete"
        );
        Ok(patterns)
    }

    /// Detect from untyped JSON (an array of transaction objects)
    ///
    /// Input is validated in full before any grouping happens.
    pub async fn detect_patterns_json(&self, value: &Value) -> Result<Vec<RecurringPattern>> {
        let transactions = parse_transactions(value)?;
        self.detect_patterns(&transactions).await
    }

    async fn group_by_merchant(
        &self,
        transactions: &[Transaction],
        use_llm: bool,
    ) -> Result<Vec<MerchantGroup>> {
        let distinct: HashSet<&str> = transactions.iter().map(|t| t.merchant.as_str()).collect();

        let canonical: HashMap<&str, String> = stream::iter(distinct)
            .map(|raw| async move {
                let merchant = self.normalizer.normalize_with(raw, use_llm).await?;
                Ok::<_, Error>((raw, merchant.name))
            })
            .buffer_unordered(self.config.concurrency)
            .try_collect()
            .await?;

        let mut grouped: BTreeMap<&str, Vec<Transaction>> = BTreeMap::new();
        for txn in transactions {
            if let Some(name) = canonical.get(txn.merchant.as_str()) {
                grouped.entry(name.as_str()).or_default().push(txn.clone());
            }
        }

        if let Some(unknown) = grouped.remove(UNKNOWN_MERCHANT) {
            debug!(count = unknown.len(), "Skipping transactions without a merchant");
        }

        Ok(grouped
            .into_iter()
            .map(|(merchant, txns)| MerchantGroup::new(merchant, txns))
            .collect())
    }

    async fn process_group(&self, group: MerchantGroup, use_llm: bool) -> Option<RecurringPattern> {
        if let Some(pattern) = detect_fixed(&group, &self.config) {
            debug!(merchant = %group.merchant, cadence = %pattern.cadence, "Fixed pattern");
            return Some(pattern);
        }

        if group.len() < self.config.min_transactions {
            return None;
        }

        if use_llm {
            return match self.variable.detect(&group.merchant, &group.transactions).await {
                Ok(detection) => {
                    debug!(
                        merchant = %group.merchant,
                        status = detection.status.as_str(),
                        is_recurring = detection.is_recurring,
                        "Variable detection"
                    );
                    to_pattern(&group, &detection)
                }
                Err(e) => {
                    warn!(merchant = %group.merchant, error = %e, "Variable detection failed");
                    None
                }
            };
        }

        if self.config.variable_heuristic {
            return detect_variable_heuristic(&group, &self.config);
        }
        None
    }
}

/// Stable A/B key for a history with no subject: digest of its sorted ids
fn history_key(transactions: &[Transaction]) -> String {
    let mut ids: Vec<&str> = transactions.iter().map(|t| t.id.as_str()).collect();
    ids.sort_unstable();
    hex::encode(Sha256::digest(ids.join("\n").as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::llm::MockBackend;
    use crate::models::{AmountType, Cadence, PatternSource};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn monthly(merchant: &str, amounts: &[Decimal], day: u32) -> Vec<Transaction> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| {
                Transaction::new(
                    &format!("{}-{}", merchant, i),
                    merchant,
                    *amount,
                    NaiveDate::from_ymd_opt(2024, i as u32 + 1, day).unwrap(),
                )
            })
            .collect()
    }

    fn pattern_only() -> RecurringDetector {
        RecurringDetector::new(RecurringConfig::default(), Arc::new(InMemoryCache::new())).unwrap()
    }

    fn llm_detector(mock: &MockBackend, config: RecurringConfig) -> RecurringDetector {
        RecurringDetector::with_llm(
            config,
            Arc::new(InMemoryCache::new()),
            mock.clone().into(),
            Arc::new(BudgetTracker::new(dec!(0.10), dec!(2.00))),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_groups_merchant_variants() {
        let mut txns = monthly("NFLX*SUB #12345", &[dec!(15.99); 2], 1);
        let mut more = monthly("NETFLIX.COM", &[dec!(15.99); 4], 1);
        for (i, t) in more.iter_mut().enumerate() {
            t.date = NaiveDate::from_ymd_opt(2024, i as u32 + 3, 1).unwrap();
        }
        txns.append(&mut more);

        let patterns = pattern_only().detect_patterns(&txns).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].merchant, "netflix");
        assert_eq!(patterns[0].transactions.len(), 6);
    }

    #[tokio::test]
    async fn test_output_sorted_by_merchant() {
        let mut txns = monthly("SPOTIFY USA", &[dec!(10.99); 4], 10);
        txns.extend(monthly("HULU LLC", &[dec!(17.99); 4], 3));
        txns.extend(monthly("NETFLIX.COM", &[dec!(15.99); 4], 1));

        let merchants: Vec<String> = pattern_only()
            .detect_patterns(&txns)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.merchant)
            .collect();
        assert_eq!(merchants, vec!["hulu", "netflix", "spotify"]);
    }

    #[tokio::test]
    async fn test_blank_merchants_skipped() {
        let txns = monthly("", &[dec!(9.99); 4], 5);
        assert!(pattern_only().detect_patterns(&txns).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heuristic_without_llm() {
        let txns = monthly(
            "City Electric Utility",
            &[dec!(45.50), dec!(52.30), dec!(48.75), dec!(54.20), dec!(58.90), dec!(62.40)],
            15,
        );
        let patterns = pattern_only().detect_patterns(&txns).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].source, PatternSource::Heuristic);
        assert_eq!(patterns[0].amount_type, AmountType::Variable);
    }

    #[tokio::test]
    async fn test_zero_amount_charges_not_reported() {
        let txns = monthly("FREE TRIAL SVC", &[dec!(0.00); 4], 8);
        assert!(pattern_only().detect_patterns(&txns).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heuristic_can_be_disabled() {
        let config = RecurringConfig {
            variable_heuristic: false,
            ..RecurringConfig::default()
        };
        let detector = RecurringDetector::new(config, Arc::new(InMemoryCache::new())).unwrap();
        let txns = monthly(
            "City Electric Utility",
            &[dec!(45.50), dec!(52.30), dec!(48.75), dec!(54.20)],
            15,
        );
        assert!(detector.detect_patterns(&txns).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_llm_variable_pattern() {
        let mock = MockBackend::new();
        let detector = llm_detector(&mock, RecurringConfig::default());
        let txns = monthly(
            "City Electric Utility",
            &[dec!(45.50), dec!(52.30), dec!(48.75), dec!(54.20), dec!(58.90), dec!(62.40)],
            15,
        );

        let patterns = detector.detect_patterns(&txns).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].cadence, Cadence::Monthly);
        assert_eq!(patterns[0].source, PatternSource::Llm);
        assert_eq!(mock.call_count_for("variable_recurring_pattern"), 1);
    }

    #[tokio::test]
    async fn test_fixed_groups_skip_llm() {
        let mock = MockBackend::new();
        let detector = llm_detector(&mock, RecurringConfig::default());
        let txns = monthly("NETFLIX.COM", &[dec!(15.99); 6], 1);

        let patterns = detector.detect_patterns(&txns).await.unwrap();
        assert_eq!(patterns[0].source, PatternSource::Pattern);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_small_groups_skip_llm() {
        let mock = MockBackend::new();
        let detector = llm_detector(&mock, RecurringConfig::default());
        let txns = monthly("Corner Bakery", &[dec!(4.00), dec!(9.50)], 2);

        assert!(detector.detect_patterns(&txns).await.unwrap().is_empty());
        assert_eq!(mock.call_count_for("variable_recurring_pattern"), 0);
    }

    #[test]
    fn test_ab_bucketing_is_stable() {
        let mock = MockBackend::new();
        let config = RecurringConfig {
            ab_test_llm_percentage: Some(50.0),
            ..RecurringConfig::default()
        };
        let detector = llm_detector(&mock, config);

        for user in ["user-1", "user-2", "user-3", "user-42"] {
            let first = detector.llm_enabled_for(Some(user));
            for _ in 0..5 {
                assert_eq!(detector.llm_enabled_for(Some(user)), first);
            }
        }
    }

    #[test]
    fn test_ab_extremes() {
        let mock = MockBackend::new();
        let none = llm_detector(
            &mock,
            RecurringConfig {
                ab_test_llm_percentage: Some(0.0),
                ..RecurringConfig::default()
            },
        );
        let all = llm_detector(
            &mock,
            RecurringConfig {
                ab_test_llm_percentage: Some(100.0),
                ..RecurringConfig::default()
            },
        );
        for user in ["a", "b", "c"] {
            assert!(!none.llm_enabled_for(Some(user)));
            assert!(all.llm_enabled_for(Some(user)));
        }
        assert!(!none.llm_enabled_for(None));
        assert!(!pattern_only().llm_enabled_for(Some("a")));
    }

    #[tokio::test]
    async fn test_ab_routing_repeatable_without_subject() {
        let mock = MockBackend::new();
        let config = RecurringConfig {
            ab_test_llm_percentage: Some(50.0),
            ..RecurringConfig::default()
        };
        let detector = llm_detector(&mock, config);

        for merchant in ["City Electric", "Gas Company", "Water Dept", "Power Co"] {
            let txns = monthly(
                merchant,
                &[dec!(45.50), dec!(52.30), dec!(48.75), dec!(54.20)],
                15,
            );
            let first = detector.detect_patterns(&txns).await.unwrap();
            for _ in 0..3 {
                let again = detector.detect_patterns(&txns).await.unwrap();
                assert_eq!(again.len(), first.len());
                assert_eq!(again[0].source, first[0].source);
            }
        }
    }

    #[tokio::test]
    async fn test_null_merchant_grouped_as_unknown() {
        let value = json!([
            {"id": "1", "merchant": "SPOTIFY USA", "amount": 10.99, "date": "2024-01-10"},
            {"id": "2", "merchant": "SPOTIFY USA", "amount": 10.99, "date": "2024-02-10"},
            {"id": "3", "merchant": "SPOTIFY USA", "amount": 10.99, "date": "2024-03-10"},
            {"id": "4", "merchant": null, "amount": 3.25, "date": "2024-03-12"},
        ]);
        let patterns = pattern_only().detect_patterns_json(&value).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].merchant, "spotify");
    }

    #[tokio::test]
    async fn test_json_input_validated() {
        let detector = pattern_only();
        assert!(detector.detect_patterns_json(&json!({"a": 1})).await.is_err());
        assert!(detector
            .detect_patterns_json(&json!([{"id": "1", "merchant": "X", "amount": 5}]))
            .await
            .is_err());

        let ok = json!([
            {"id": "1", "merchant": "SPOTIFY USA", "amount": 10.99, "date": "2024-01-10"},
            {"id": "2", "merchant": "SPOTIFY USA", "amount": 10.99, "date": "2024-02-10"},
            {"id": "3", "merchant": "SPOTIFY USA", "amount": 10.99, "date": "2024-03-10"},
        ]);
        let patterns = detector.detect_patterns_json(&ok).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].merchant, "spotify");
    }
}
