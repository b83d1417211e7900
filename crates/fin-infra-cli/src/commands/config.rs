//! Configuration display commands

use anyhow::Result;
use fin_infra_core::config::{default_config_path, ENABLE_LLM_ENV, LLM_MODEL_ENV, LLM_PROVIDER_ENV};
use fin_infra_core::RecurringConfig;

pub fn cmd_config_show(config: &RecurringConfig) -> Result<()> {
    println!("⚙️  Recurring detection configuration\n");

    println!("LLM");
    println!("   enable_llm:              {}", config.enable_llm);
    println!("   llm_provider:            {}", config.llm_provider);
    println!("   llm_model:               {}", config.llm_model);
    println!("   llm_timeout:             {}s", config.llm_timeout.as_secs());
    println!(
        "   ab_test_llm_percentage:  {}",
        config
            .ab_test_llm_percentage
            .map(|p| format!("{}%", p))
            .unwrap_or_else(|| "off (all requests)".to_string())
    );

    println!("\nBudget");
    println!("   max_cost_per_day:        ${}", config.max_cost_per_day);
    println!("   max_cost_per_month:      ${}", config.max_cost_per_month);
    println!("   cost_per_detection:      ${}", config.cost_per_detection);
    println!("   cost_per_normalization:  ${}", config.cost_per_normalization);

    println!("\nDetection");
    println!("   min_transactions:        {}", config.min_transactions);
    println!("   amount_tolerance:        {}", config.amount_tolerance);
    println!("   max_interval_cv:         {}", config.max_interval_cv);
    println!("   variable_heuristic:      {}", config.variable_heuristic);
    println!("   variable_max_amount_cv:  {}", config.variable_max_amount_cv);
    println!("   concurrency:             {}", config.concurrency);

    if !config.merchant_rules.is_empty() {
        println!("\nMerchant rules");
        for rule in &config.merchant_rules {
            println!("   {} → {}", rule.pattern, rule.canonical);
        }
    }

    Ok(())
}

pub fn cmd_config_path() -> Result<()> {
    match default_config_path() {
        Some(path) => {
            let status = if path.exists() { "present" } else { "not created" };
            println!("Override file: {} ({})", path.display(), status);
        }
        None => println!("Override file: (no data directory available)"),
    }

    println!();
    println!("Environment overrides:");
    for name in [ENABLE_LLM_ENV, LLM_PROVIDER_ENV, LLM_MODEL_ENV] {
        let value = std::env::var(name).unwrap_or_else(|_| "(unset)".to_string());
        println!("  {:<26} {}", name, value);
    }

    Ok(())
}
