//! Recurring detection command

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fin_infra_core::import::{parse_csv, parse_transactions};
use fin_infra_core::{
    AmountType, MerchantCache, RecurringConfig, RecurringDetector, RecurringPattern, Transaction,
};

use super::{build_detector, percent, truncate};

/// Read transactions from a `.csv` file or a JSON array
pub fn read_transactions(file: &Path) -> Result<Vec<Transaction>> {
    let is_csv = file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    if is_csv {
        let reader =
            File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
        parse_csv(reader).with_context(|| format!("Failed to parse CSV {}", file.display()))
    } else {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("{} is not valid JSON", file.display()))?;
        parse_transactions(&value)
            .with_context(|| format!("Invalid transactions in {}", file.display()))
    }
}

pub async fn cmd_detect(
    config: RecurringConfig,
    cache: Arc<dyn MerchantCache>,
    file: &Path,
    llm: bool,
    user: Option<&str>,
    json: bool,
) -> Result<()> {
    let transactions = read_transactions(file)?;
    if !json {
        println!(
            "🔍 Detecting recurring charges in {} transactions...",
            transactions.len()
        );
    }

    let detector = build_detector(config, cache, llm)?;
    let patterns = detector
        .detect_patterns_for(user, &transactions)
        .await
        .context("Detection failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&patterns)?);
        return Ok(());
    }

    print_patterns(&patterns);
    print_budget(&detector);
    Ok(())
}

fn print_patterns(patterns: &[RecurringPattern]) {
    if patterns.is_empty() {
        println!("\n✅ No recurring charges found");
        return;
    }

    println!("\n📋 Recurring charges ({}):\n", patterns.len());
    println!(
        "{:<24} {:<10} {:<9} {:>18} {:>6}  {:<10} {}",
        "MERCHANT", "CADENCE", "TYPE", "AMOUNT", "CONF", "SOURCE", "LAST SEEN"
    );
    println!("{}", "-".repeat(92));

    for p in patterns {
        println!(
            "{:<24} {:<10} {:<9} {:>18} {:>6}  {:<10} {}",
            truncate(&p.merchant, 24),
            p.cadence.as_str(),
            p.amount_type.as_str(),
            p.expected_amount.to_string(),
            percent(p.confidence),
            p.source.as_str(),
            p.last_seen
        );
    }

    let variable: Vec<&RecurringPattern> = patterns
        .iter()
        .filter(|p| p.amount_type == AmountType::Variable)
        .collect();
    if !variable.is_empty() {
        println!("\nVariable charges:");
        for p in variable {
            println!("  • {}: {}", p.merchant, p.reasoning);
        }
    }
}

fn print_budget(detector: &RecurringDetector) {
    if let Some(status) = detector.get_budget_status() {
        println!();
        println!(
            "💰 LLM spend today: ${} of ${} (month: ${} of ${})",
            status.daily_cost, status.daily_limit, status.monthly_cost, status.monthly_limit
        );
        if status.exceeded {
            println!("   ⚠️  Budget exceeded; remaining groups used pattern detection only");
        }
    }
}
