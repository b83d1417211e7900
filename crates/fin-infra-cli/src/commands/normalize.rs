//! Merchant normalization command

use std::sync::Arc;

use anyhow::{Context, Result};
use fin_infra_core::models::NormalizationSource;
use fin_infra_core::{MerchantCache, RecurringConfig};

use super::{build_detector, percent, truncate};

pub async fn cmd_normalize(
    config: RecurringConfig,
    cache: Arc<dyn MerchantCache>,
    merchants: &[String],
    llm: bool,
) -> Result<()> {
    let detector = build_detector(config, cache, llm)?;
    let normalizer = detector.normalizer();
    let allow_llm = detector.llm_enabled_for(None);

    println!();
    println!("{:<36} {:<28} {:>6}  {}", "RAW", "CANONICAL", "CONF", "SOURCE");
    println!("{}", "-".repeat(84));

    for raw in merchants {
        let canonical = normalizer
            .normalize_with(raw, allow_llm)
            .await
            .with_context(|| format!("Failed to normalize {:?}", raw))?;

        let source = match canonical.source {
            NormalizationSource::Sentinel => "empty",
            NormalizationSource::Dictionary => "dictionary",
            NormalizationSource::Cache => "cache",
            NormalizationSource::Llm => "llm",
            NormalizationSource::Cleaned => "cleaned",
        };
        println!(
            "{:<36} {:<28} {:>6}  {}",
            truncate(raw, 36),
            truncate(&canonical.name, 28),
            percent(canonical.confidence),
            source
        );
    }

    let stats = normalizer.stats();
    if stats.llm_calls > 0 || stats.cache_hits > 0 {
        println!();
        println!(
            "   Cache hits: {}, LLM calls: {}, LLM failures: {}",
            stats.cache_hits, stats.llm_calls, stats.llm_failures
        );
    }

    Ok(())
}
