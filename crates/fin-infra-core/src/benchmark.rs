//! Accuracy benchmark for recurring detection
//!
//! Runs a detector over a labeled dataset, one merchant history per case,
//! and scores whether any pattern was found against the ground truth.
//! Pattern-only and LLM-enabled detectors are held to different targets.

use std::fs;
use std::path::Path;
use std::time::Instant;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::Transaction;
use crate::recurring::RecurringDetector;

/// Which detector configuration a run measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BenchmarkMode {
    PatternOnly,
    Llm,
}

impl BenchmarkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatternOnly => "pattern-only",
            Self::Llm => "llm",
        }
    }
}

/// One merchant history with its ground truth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledCase {
    pub merchant_name: String,
    /// Expected canonical merchant
    pub canonical_merchant: String,
    pub amounts: Vec<Decimal>,
    pub dates: Vec<NaiveDate>,
    pub is_recurring: bool,
    /// simple, variable, seasonal, or random
    pub pattern_type: String,
    /// subscription, utility, or other
    pub category: String,
}

impl LabeledCase {
    fn is_variable(&self) -> bool {
        matches!(self.pattern_type.as_str(), "variable" | "seasonal")
    }

    fn is_simple(&self) -> bool {
        self.pattern_type == "simple"
    }

    /// Expand into transactions `txn_0..txn_n`
    pub fn transactions(&self) -> Vec<Transaction> {
        self.amounts
            .iter()
            .zip(&self.dates)
            .enumerate()
            .map(|(i, (amount, date))| Transaction {
                id: format!("txn_{}", i),
                merchant: self.merchant_name.clone(),
                amount: *amount,
                date: *date,
                description: self.merchant_name.clone(),
            })
            .collect()
    }
}

/// Scores for one benchmark run
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
    pub mode: BenchmarkMode,
    pub total_cases: usize,
    pub correct_predictions: usize,
    pub accuracy: f64,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub false_positive_rate: f64,
    pub false_negative_rate: f64,
    /// Share of cases whose detected merchant matches the expected canonical name
    pub merchant_grouping_accuracy: f64,
    pub variable_detection_accuracy: f64,
    pub simple_pattern_accuracy: f64,
    pub avg_processing_time_ms: f64,
    pub total_cost: Decimal,
}

/// One acceptance target and whether the run met it
#[derive(Debug, Clone, Serialize)]
pub struct TargetCheck {
    pub name: &'static str,
    pub actual: f64,
    /// Human-readable threshold, e.g. ">= 85%"
    pub target: &'static str,
    pub passed: bool,
}

impl BenchmarkResult {
    /// Compare against the acceptance targets for this run's mode
    pub fn check_targets(&self) -> Vec<TargetCheck> {
        match self.mode {
            BenchmarkMode::PatternOnly => vec![
                TargetCheck {
                    name: "accuracy",
                    actual: self.accuracy,
                    target: ">= 85%",
                    passed: self.accuracy >= 0.85,
                },
                TargetCheck {
                    name: "false positive rate",
                    actual: self.false_positive_rate,
                    target: "<= 8%",
                    passed: self.false_positive_rate <= 0.08,
                },
            ],
            BenchmarkMode::Llm => vec![
                TargetCheck {
                    name: "accuracy",
                    actual: self.accuracy,
                    target: ">= 92%",
                    passed: self.accuracy >= 0.92,
                },
                TargetCheck {
                    name: "false positive rate",
                    actual: self.false_positive_rate,
                    target: "< 5%",
                    passed: self.false_positive_rate < 0.05,
                },
                TargetCheck {
                    name: "variable detection",
                    actual: self.variable_detection_accuracy,
                    target: ">= 88%",
                    passed: self.variable_detection_accuracy >= 0.88,
                },
                TargetCheck {
                    name: "merchant grouping",
                    actual: self.merchant_grouping_accuracy,
                    target: ">= 95%",
                    passed: self.merchant_grouping_accuracy >= 0.95,
                },
            ],
        }
    }

    pub fn targets_met(&self) -> bool {
        self.check_targets().iter().all(|c| c.passed)
    }
}

/// Load a labeled dataset from a JSON array of cases
pub fn load_dataset(path: &Path) -> Result<Vec<LabeledCase>> {
    let content = fs::read_to_string(path)?;
    let cases: Vec<LabeledCase> = serde_json::from_str(&content)?;
    for case in &cases {
        if case.amounts.len() != case.dates.len() {
            return Err(Error::InvalidData(format!(
                "{}: {} amounts but {} dates",
                case.merchant_name,
                case.amounts.len(),
                case.dates.len()
            )));
        }
    }
    Ok(cases)
}

/// Run `detector` over every case
pub async fn run_benchmark(
    detector: &RecurringDetector,
    mode: BenchmarkMode,
    dataset: &[LabeledCase],
) -> Result<BenchmarkResult> {
    let cost_before = spent(detector);

    let mut correct = 0;
    let mut false_positives = 0;
    let mut false_negatives = 0;
    let mut merchant_correct = 0;
    let (mut variable_correct, mut variable_total) = (0, 0);
    let (mut simple_correct, mut simple_total) = (0, 0);
    let mut total_ms = 0.0;

    for case in dataset {
        let start = Instant::now();
        let patterns = detector.detect_patterns(&case.transactions()).await?;
        total_ms += start.elapsed().as_secs_f64() * 1000.0;

        let predicted = !patterns.is_empty();
        let hit = predicted == case.is_recurring;
        debug!(
            merchant = %case.merchant_name,
            expected = case.is_recurring,
            predicted,
            "Benchmark case"
        );

        if hit {
            correct += 1;
        } else if predicted {
            false_positives += 1;
        } else {
            false_negatives += 1;
        }

        if case.is_variable() {
            variable_total += 1;
            variable_correct += usize::from(hit);
        } else if case.is_simple() {
            simple_total += 1;
            simple_correct += usize::from(hit);
        }

        if let Some(pattern) = patterns.first() {
            let found = pattern.merchant.to_lowercase();
            let expected = case.canonical_merchant.to_lowercase();
            if found.contains(&expected) || expected.contains(&found) {
                merchant_correct += 1;
            }
        }
    }

    let total = dataset.len();
    let result = BenchmarkResult {
        mode,
        total_cases: total,
        correct_predictions: correct,
        accuracy: ratio(correct, total),
        false_positives,
        false_negatives,
        false_positive_rate: ratio(false_positives, total),
        false_negative_rate: ratio(false_negatives, total),
        merchant_grouping_accuracy: ratio(merchant_correct, total),
        variable_detection_accuracy: ratio(variable_correct, variable_total),
        simple_pattern_accuracy: ratio(simple_correct, simple_total),
        avg_processing_time_ms: if total > 0 { total_ms / total as f64 } else { 0.0 },
        total_cost: spent(detector) - cost_before,
    };

    info!(
        mode = mode.as_str(),
        accuracy = result.accuracy,
        false_positive_rate = result.false_positive_rate,
        "Benchmark complete"
    );
    Ok(result)
}

fn spent(detector: &RecurringDetector) -> Decimal {
    detector
        .get_budget_status()
        .map(|s| s.monthly_cost)
        .unwrap_or_default()
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Built-in labeled dataset: subscriptions under merchant-name variants,
/// variable/seasonal utilities, and irregular spending
pub fn default_dataset() -> Vec<LabeledCase> {
    vec![
        monthly_case("NFLX*SUB #12345", "netflix", &[15.99; 6], 1, "simple", "subscription"),
        monthly_case("NETFLIX.COM", "netflix", &[15.99; 6], 15, "simple", "subscription"),
        monthly_case("Netflix Inc", "netflix", &[15.99; 6], 20, "simple", "subscription"),
        monthly_case("SQ *STARBUCKS #543", "starbucks", &[5.50; 6], 5, "simple", "subscription"),
        monthly_case("SPOTIFY USA", "spotify", &[10.99; 6], 10, "simple", "subscription"),
        monthly_case(
            "City Electric Utility",
            "city electric",
            &[45.50, 52.30, 48.75, 54.20, 58.90, 62.40],
            15,
            "seasonal",
            "utility",
        ),
        monthly_case(
            "Natural Gas Company",
            "gas company",
            &[45.0, 120.0, 115.0, 85.0, 50.0, 40.0],
            1,
            "seasonal",
            "utility",
        ),
        monthly_case(
            "Water Dept",
            "water utility",
            &[35.0, 38.0, 36.5, 37.0, 35.5, 36.0],
            1,
            "variable",
            "utility",
        ),
        monthly_case(
            "T-Mobile USA",
            "t-mobile",
            &[50.0, 78.50, 50.0, 50.0, 50.0, 65.30],
            15,
            "variable",
            "utility",
        ),
        monthly_case(
            "AT&T Wireless",
            "at&t",
            &[65.0, 65.0, 92.0, 65.0, 65.0, 65.0],
            20,
            "variable",
            "utility",
        ),
        irregular_case(
            "Random Store #123",
            "random store",
            &[25.0, 150.0, 40.0, 200.0, 15.0, 90.0],
            &[(1, 5), (2, 12), (3, 20), (4, 8), (5, 15), (6, 2)],
        ),
        irregular_case(
            "Coffee Shop",
            "coffee shop",
            &[4.50, 12.0, 3.0, 25.0, 8.50, 15.0],
            &[(1, 8), (1, 22), (2, 5), (3, 10), (4, 15), (5, 20)],
        ),
    ]
}

fn monthly_case(
    merchant: &str,
    canonical: &str,
    amounts: &[f64],
    day: u32,
    pattern_type: &str,
    category: &str,
) -> LabeledCase {
    let dates: Vec<(u32, u32)> = (1..=amounts.len() as u32).map(|m| (m, day)).collect();
    LabeledCase {
        is_recurring: true,
        pattern_type: pattern_type.to_string(),
        category: category.to_string(),
        ..irregular_case(merchant, canonical, amounts, &dates)
    }
}

fn irregular_case(
    merchant: &str,
    canonical: &str,
    amounts: &[f64],
    dates: &[(u32, u32)],
) -> LabeledCase {
    LabeledCase {
        merchant_name: merchant.to_string(),
        canonical_merchant: canonical.to_string(),
        amounts: amounts
            .iter()
            .filter_map(|a| Decimal::from_f64_retain(*a))
            .map(|a| a.round_dp(2))
            .collect(),
        dates: dates
            .iter()
            .filter_map(|(m, d)| NaiveDate::from_ymd_opt(2024, *m, *d))
            .collect(),
        is_recurring: false,
        pattern_type: "random".to_string(),
        category: "other".to_string(),
    }
}
