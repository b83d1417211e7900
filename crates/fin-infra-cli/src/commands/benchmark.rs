//! Accuracy benchmark command

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fin_infra_core::benchmark::{default_dataset, load_dataset, run_benchmark};
use fin_infra_core::{
    BenchmarkMode, BenchmarkResult, BudgetTracker, InMemoryCache, LlmClient, RecurringConfig,
    RecurringDetector,
};
use tracing::warn;

use super::percent;

/// Modes selected by `--pattern-only` / `--llm-only` (both when neither is given)
pub fn benchmark_modes(pattern_only: bool, llm_only: bool) -> Vec<BenchmarkMode> {
    match (pattern_only, llm_only) {
        (true, _) => vec![BenchmarkMode::PatternOnly],
        (false, true) => vec![BenchmarkMode::Llm],
        (false, false) => vec![BenchmarkMode::PatternOnly, BenchmarkMode::Llm],
    }
}

pub async fn cmd_benchmark(
    config: RecurringConfig,
    dataset: Option<&Path>,
    modes: &[BenchmarkMode],
    json: bool,
) -> Result<()> {
    let cases = match dataset {
        Some(path) => load_dataset(path)
            .with_context(|| format!("Failed to load dataset {}", path.display()))?,
        None => default_dataset(),
    };

    if !json {
        println!("📊 Benchmarking recurring detection on {} cases...", cases.len());
    }

    let mut results = Vec::new();
    for mode in modes {
        // Each mode gets a fresh cache so runs cannot warm each other up
        let cache = Arc::new(InMemoryCache::new());
        let detector = match mode {
            BenchmarkMode::PatternOnly => {
                RecurringDetector::new(config.clone().with_llm(false), cache)?
            }
            BenchmarkMode::Llm => {
                let config = config.clone().with_llm(true);
                match LlmClient::from_config(&config) {
                    Ok(client) => {
                        let budget = Arc::new(BudgetTracker::from_config(&config));
                        RecurringDetector::with_llm(config, cache, client, budget)?
                    }
                    Err(e) if modes.len() > 1 => {
                        warn!(error = %e, "Skipping LLM benchmark");
                        if !json {
                            println!("   ⚠️  Skipping LLM mode: {}", e);
                            println!("   💡 Tip: set LLM_BACKEND=mock to benchmark with the mock model");
                        }
                        continue;
                    }
                    Err(e) => return Err(e).context("Failed to set up LLM client"),
                }
            }
        };

        let result = run_benchmark(&detector, *mode, &cases)
            .await
            .with_context(|| format!("{} benchmark failed", mode.as_str()))?;
        results.push(result);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for result in &results {
        print_result(result);
    }
    Ok(())
}

fn print_result(result: &BenchmarkResult) {
    println!();
    println!("━━━ {} ━━━", result.mode.as_str());
    println!(
        "   Accuracy:            {} ({}/{})",
        percent(result.accuracy),
        result.correct_predictions,
        result.total_cases
    );
    println!(
        "   False positives:     {} ({})",
        result.false_positives,
        percent(result.false_positive_rate)
    );
    println!(
        "   False negatives:     {} ({})",
        result.false_negatives,
        percent(result.false_negative_rate)
    );
    println!("   Merchant grouping:   {}", percent(result.merchant_grouping_accuracy));
    println!("   Simple patterns:     {}", percent(result.simple_pattern_accuracy));
    println!("   Variable patterns:   {}", percent(result.variable_detection_accuracy));
    println!("   Avg time per case:   {:.2}ms", result.avg_processing_time_ms);
    println!("   LLM cost:            ${}", result.total_cost);

    println!();
    for check in result.check_targets() {
        let mark = if check.passed { "✅" } else { "❌" };
        println!(
            "   {} {:<22} {:>7} (target {})",
            mark,
            check.name,
            percent(check.actual),
            check.target
        );
    }
}
