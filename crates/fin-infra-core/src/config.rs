//! Recurring detection configuration
//!
//! Configuration is loaded in three layers:
//! 1. Embedded default (`config/recurring.toml`, compiled into the binary)
//! 2. Override file (explicit path, or ~/.local/share/fin-infra/config/recurring.toml)
//! 3. Environment variables (`FIN_INFRA_ENABLE_LLM`, `FIN_INFRA_LLM_PROVIDER`,
//!    `FIN_INFRA_LLM_MODEL`)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default configuration (embedded in binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/recurring.toml");

/// Environment variable toggling the LLM layer
pub const ENABLE_LLM_ENV: &str = "FIN_INFRA_ENABLE_LLM";
/// Environment variable selecting the LLM provider
pub const LLM_PROVIDER_ENV: &str = "FIN_INFRA_LLM_PROVIDER";
/// Environment variable selecting the LLM model
pub const LLM_MODEL_ENV: &str = "FIN_INFRA_LLM_MODEL";

/// A user-defined merchant rule: raw strings matching `pattern` map to `canonical`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantRule {
    pub pattern: String,
    pub canonical: String,
}

/// Resolved configuration for the detection pipeline
#[derive(Debug, Clone, Serialize)]
pub struct RecurringConfig {
    /// Route ambiguous groups and unknown merchants through the LLM
    pub enable_llm: bool,
    pub llm_provider: String,
    pub llm_model: String,
    /// Per-request LLM timeout
    pub llm_timeout: Duration,
    /// Share of users/requests routed to the LLM layer (0-100); None = all
    pub ab_test_llm_percentage: Option<f64>,

    pub max_cost_per_day: Decimal,
    pub max_cost_per_month: Decimal,
    pub cost_per_detection: Decimal,
    pub cost_per_normalization: Decimal,

    /// Minimum transactions before a group is considered (default: 3)
    pub min_transactions: usize,
    /// Fixed amounts must stay within this fraction of the mean (default: 0.02)
    pub amount_tolerance: f64,
    /// Max coefficient of variation of day gaps for a regular cadence (default: 0.25)
    pub max_interval_cv: f64,
    /// Use the deterministic variable check when the LLM layer is off
    pub variable_heuristic: bool,
    /// Max coefficient of variation of amounts for the variable check (default: 0.30)
    pub variable_max_amount_cv: f64,
    /// Merchant groups processed concurrently
    pub concurrency: usize,

    /// Extra merchant rules checked before the built-in brand dictionary
    pub merchant_rules: Vec<MerchantRule>,
}

impl Default for RecurringConfig {
    fn default() -> Self {
        Self {
            enable_llm: false,
            llm_provider: "google".to_string(),
            llm_model: "gemini-2.0-flash-exp".to_string(),
            llm_timeout: Duration::from_secs(30),
            ab_test_llm_percentage: None,
            max_cost_per_day: Decimal::new(10, 2),
            max_cost_per_month: Decimal::new(200, 2),
            cost_per_detection: Decimal::new(1, 4),
            cost_per_normalization: Decimal::new(8, 5),
            min_transactions: 3,
            amount_tolerance: 0.02,
            max_interval_cv: 0.25,
            variable_heuristic: true,
            variable_max_amount_cv: 0.30,
            concurrency: 8,
            merchant_rules: Vec::new(),
        }
    }
}

impl RecurringConfig {
    /// Load configuration from the default override location (or embedded
    /// default), then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = load_config(None)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = load_config(Some(path))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text (no environment overrides)
    pub fn from_toml(content: &str) -> Result<Self> {
        let config = parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Builder-style toggle used by the CLI `--llm` flag and tests
    pub fn with_llm(mut self, enabled: bool) -> Self {
        self.enable_llm = enabled;
        self
    }

    fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(ENABLE_LLM_ENV) {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.enable_llm = true,
                "0" | "false" | "no" | "off" => self.enable_llm = false,
                _ => warn!(value = %value, "Ignoring unrecognized {}", ENABLE_LLM_ENV),
            }
        }
        if let Ok(provider) = std::env::var(LLM_PROVIDER_ENV) {
            self.llm_provider = provider;
        }
        if let Ok(model) = std::env::var(LLM_MODEL_ENV) {
            self.llm_model = model;
        }
    }

    /// Reject values the detectors cannot work with
    pub fn validate(&self) -> Result<()> {
        if let Some(pct) = self.ab_test_llm_percentage {
            if !(0.0..=100.0).contains(&pct) {
                return Err(Error::Config(format!(
                    "ab_test_percentage must be between 0 and 100, got {}",
                    pct
                )));
            }
        }
        if self.max_cost_per_day < Decimal::ZERO || self.max_cost_per_month < Decimal::ZERO {
            return Err(Error::Config("budget limits must not be negative".into()));
        }
        if self.cost_per_detection < Decimal::ZERO || self.cost_per_normalization < Decimal::ZERO
        {
            return Err(Error::Config("per-call costs must not be negative".into()));
        }
        if self.min_transactions < 2 {
            return Err(Error::Config("min_transactions must be at least 2".into()));
        }
        if !(0.0..1.0).contains(&self.amount_tolerance) {
            return Err(Error::Config(
                "amount_tolerance must be in [0, 1)".into(),
            ));
        }
        if self.max_interval_cv <= 0.0 || self.variable_max_amount_cv <= 0.0 {
            return Err(Error::Config(
                "coefficient of variation thresholds must be positive".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("fin-infra").join("config").join("recurring.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<RecurringConfig> {
    let path = match override_path {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Some(path.to_path_buf())
        }
        None => default_config_path().filter(|p| p.exists()),
    };

    let content = match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading recurring config override");
            fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
        }
        None => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    llm: Option<RawLlm>,
    budget: Option<RawBudget>,
    detection: Option<RawDetection>,
    #[serde(default)]
    merchant_rules: Vec<MerchantRule>,
}

#[derive(Debug, Deserialize)]
struct RawLlm {
    enabled: Option<bool>,
    provider: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    ab_test_percentage: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawBudget {
    max_cost_per_day: Option<Decimal>,
    max_cost_per_month: Option<Decimal>,
    cost_per_detection: Option<Decimal>,
    cost_per_normalization: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    min_transactions: Option<usize>,
    amount_tolerance: Option<f64>,
    max_interval_cv: Option<f64>,
    variable_heuristic: Option<bool>,
    variable_max_amount_cv: Option<f64>,
    concurrency: Option<usize>,
}

/// Parse TOML into config, filling gaps from defaults
fn parse_config(content: &str) -> Result<RecurringConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = RecurringConfig::default();

    if let Some(llm) = raw.llm {
        if let Some(enabled) = llm.enabled {
            config.enable_llm = enabled;
        }
        if let Some(provider) = llm.provider {
            config.llm_provider = provider;
        }
        if let Some(model) = llm.model {
            config.llm_model = model;
        }
        if let Some(timeout) = llm.timeout_secs {
            config.llm_timeout = Duration::from_secs(timeout);
        }
        config.ab_test_llm_percentage = llm.ab_test_percentage;
    }

    if let Some(budget) = raw.budget {
        if let Some(v) = budget.max_cost_per_day {
            config.max_cost_per_day = v;
        }
        if let Some(v) = budget.max_cost_per_month {
            config.max_cost_per_month = v;
        }
        if let Some(v) = budget.cost_per_detection {
            config.cost_per_detection = v;
        }
        if let Some(v) = budget.cost_per_normalization {
            config.cost_per_normalization = v;
        }
    }

    if let Some(detection) = raw.detection {
        if let Some(v) = detection.min_transactions {
            config.min_transactions = v;
        }
        if let Some(v) = detection.amount_tolerance {
            config.amount_tolerance = v;
        }
        if let Some(v) = detection.max_interval_cv {
            config.max_interval_cv = v;
        }
        if let Some(v) = detection.variable_heuristic {
            config.variable_heuristic = v;
        }
        if let Some(v) = detection.variable_max_amount_cv {
            config.variable_max_amount_cv = v;
        }
        if let Some(v) = detection.concurrency {
            config.concurrency = v;
        }
    }

    config.merchant_rules = raw.merchant_rules;

    Ok(config)
}
