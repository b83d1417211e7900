//! Domain models for recurring detection

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A transaction as supplied by the caller
///
/// Never mutated by the detectors. The sign of `amount` is ignored during
/// detection (charges and refunds are compared by magnitude).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub merchant: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
}

impl Transaction {
    pub fn new(id: &str, merchant: &str, amount: Decimal, date: NaiveDate) -> Self {
        Self {
            id: id.to_string(),
            merchant: merchant.to_string(),
            amount,
            date,
            description: String::new(),
        }
    }
}

/// Recurring interval classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Weekly,
    Monthly,
    Quarterly,
    Annual,
    Unknown,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient parse for free-form LLM output ("Monthly", "every month", "yearly")
    pub fn from_loose(s: &str) -> Self {
        let s = s.trim().to_lowercase();
        if s.contains("week") {
            Self::Weekly
        } else if s.contains("quarter") {
            Self::Quarterly
        } else if s.contains("annual") || s.contains("year") {
            Self::Annual
        } else if s.contains("month") {
            Self::Monthly
        } else {
            Self::Unknown
        }
    }
}

impl std::str::FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "annual" | "yearly" => Ok(Self::Annual),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Unknown cadence: {}", s)),
        }
    }
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a recurring charge keeps a near-constant amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountType {
    Fixed,
    Variable,
}

impl AmountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Variable => "variable",
        }
    }
}

impl std::fmt::Display for AmountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Expected charge: a single amount for fixed patterns, a band for variable ones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExpectedAmount {
    Fixed {
        amount: Decimal,
    },
    Range {
        min: Decimal,
        max: Decimal,
        /// Range as described by the LLM, e.g. "$45-$65"
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
}

impl std::fmt::Display for ExpectedAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed { amount } => write!(f, "${:.2}", amount),
            Self::Range { min, max, .. } => write!(f, "${:.2}-${:.2}", min, max),
        }
    }
}

/// Which detection layer established a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSource {
    /// Fixed-amount cadence match
    Pattern,
    /// Deterministic variable-amount check
    Heuristic,
    /// LLM variable/seasonal classification
    Llm,
}

impl PatternSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Heuristic => "heuristic",
            Self::Llm => "llm",
        }
    }
}

/// A detected recurring charge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringPattern {
    pub merchant: String,
    pub cadence: Cadence,
    pub amount_type: AmountType,
    pub expected_amount: ExpectedAmount,
    /// Always within [0.0, 1.0]
    pub confidence: f64,
    pub reasoning: String,
    pub last_seen: NaiveDate,
    pub transactions: Vec<Transaction>,
    pub source: PatternSource,
}

impl RecurringPattern {
    /// Build a pattern from a merchant group, clamping confidence into [0, 1]
    pub fn from_group(
        group: &MerchantGroup,
        cadence: Cadence,
        amount_type: AmountType,
        expected_amount: ExpectedAmount,
        confidence: f64,
        reasoning: String,
        source: PatternSource,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let last_seen = group
            .transactions
            .last()
            .map(|t| t.date)
            .unwrap_or_default();

        Self {
            merchant: group.merchant.clone(),
            cadence,
            amount_type,
            expected_amount,
            confidence,
            reasoning,
            last_seen,
            transactions: group.transactions.clone(),
            source,
        }
    }
}

/// Transactions sharing a canonical merchant, ordered by date ascending
#[derive(Debug, Clone)]
pub struct MerchantGroup {
    pub merchant: String,
    pub transactions: Vec<Transaction>,
}

impl MerchantGroup {
    pub fn new(merchant: &str, mut transactions: Vec<Transaction>) -> Self {
        transactions.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Self {
            merchant: merchant.to_string(),
            transactions,
        }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Absolute transaction amounts in date order
    pub fn amounts(&self) -> Vec<Decimal> {
        self.transactions.iter().map(|t| t.amount.abs()).collect()
    }

    /// Day gaps between consecutive transactions
    pub fn day_gaps(&self) -> Vec<i64> {
        self.transactions
            .windows(2)
            .map(|w| (w[1].date - w[0].date).num_days())
            .collect()
    }
}

/// How a canonical merchant name was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationSource {
    /// Empty input
    Sentinel,
    /// Known-brand dictionary or configured rule
    Dictionary,
    /// Earlier LLM answer read back from the cache
    Cache,
    Llm,
    /// Deterministically cleaned string, unrecognized
    Cleaned,
}

/// A canonical merchant identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMerchant {
    pub name: String,
    pub confidence: f64,
    pub source: NormalizationSource,
}

/// Normalization cache record, stored as JSON under `merchant_norm:<raw>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationCacheEntry {
    /// Lowercased raw merchant string
    pub raw_merchant_key: String,
    pub canonical_merchant: String,
    #[serde(default = "default_cached_confidence")]
    pub confidence: f64,
    pub normalized_at: DateTime<Utc>,
}

fn default_cached_confidence() -> f64 {
    0.8
}

/// Why a variable detection result has the confidence it has
///
/// Keeps the three fallback paths apart without inspecting reasoning text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    /// The LLM answered
    #[default]
    Detected,
    /// Budget exhausted, no call made (confidence 0.5)
    BudgetExceeded,
    /// The call failed or returned garbage (confidence 0.3)
    LlmError,
    /// No LLM configured (confidence 0.5)
    LlmDisabled,
}

impl DetectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::BudgetExceeded => "budget_exceeded",
            Self::LlmError => "llm_error",
            Self::LlmDisabled => "llm_disabled",
        }
    }
}

/// Result of the variable/seasonal detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecurringPattern {
    pub is_recurring: bool,
    pub cadence: Option<String>,
    pub expected_range: Option<String>,
    pub reasoning: String,
    pub confidence: f64,
    #[serde(default)]
    pub status: DetectionStatus,
}

impl VariableRecurringPattern {
    pub(crate) fn fallback(status: DetectionStatus, confidence: f64, reasoning: String) -> Self {
        Self {
            is_recurring: false,
            cadence: None,
            expected_range: None,
            reasoning,
            confidence,
            status,
        }
    }
}
