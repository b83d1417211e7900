//! LLM cost simulation command

use anyhow::{Context, Result};
use fin_infra_core::simulation::simulate_costs;
use fin_infra_core::{CostReport, RecurringConfig, SimulationOptions};

use super::percent;

/// Assemble simulation options from the command-line flags
pub fn simulation_options(
    users: usize,
    days: u32,
    ab_test: bool,
    llm_percentage: f64,
    no_cache: bool,
    seed: u64,
) -> SimulationOptions {
    SimulationOptions {
        users,
        days,
        enable_cache: !no_cache,
        llm_percentage: ab_test.then_some(llm_percentage),
        seed,
    }
}

pub async fn cmd_measure_costs(
    config: RecurringConfig,
    options: SimulationOptions,
    json: bool,
) -> Result<()> {
    if !json {
        println!(
            "💸 Simulating {} users over {} days (cache {}, LLM for {})...",
            options.users,
            options.days,
            if options.enable_cache { "on" } else { "off" },
            options
                .llm_percentage
                .map(|p| format!("{}% of users", p))
                .unwrap_or_else(|| "all users".to_string())
        );
    }

    let report = simulate_costs(&config, &options)
        .await
        .context("Cost simulation failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &CostReport) {
    println!();
    println!("📈 Traffic");
    println!("   Users routed to LLM:   {}/{}", report.llm_users, report.users);
    println!("   Total requests:        {}", report.total_requests);
    println!("   Normalizations:        {}", report.normalizations);
    println!("   Detections:            {}", report.detections);
    println!(
        "   Requests/user/day:     {:.2}",
        report.avg_requests_per_user_per_day
    );

    println!();
    println!("🗄️  Cache");
    println!("   Hits:                  {}", report.cache_hits);
    println!("   Misses:                {}", report.cache_misses);
    println!("   Hit rate:              {}", percent(report.cache_hit_rate));

    println!();
    println!("💰 Cost");
    println!("   LLM calls:             {}", report.llm_calls);
    println!("   Total:                 ${}", report.total_cost);
    println!(
        "   Per user per day:      ${:.6}",
        report.avg_cost_per_user_per_day
    );
    println!(
        "   Per user per month:    ${:.6}",
        report.avg_cost_per_user_per_month
    );
    println!(
        "   Per user per year:     ${:.4}",
        report.avg_cost_per_user_per_year
    );
    if report.budget_exceeded_days > 0 {
        println!(
            "   ⚠️  Daily budget ran out on {} day(s)",
            report.budget_exceeded_days
        );
    }

    println!();
    for check in report.check_targets() {
        let mark = if check.passed { "✅" } else { "❌" };
        let actual = if check.name == "cache hit rate" {
            percent(check.actual)
        } else {
            format!("${:.6}", check.actual)
        };
        println!("   {} {:<24} {:>10} (target {})", mark, check.name, actual, check.target);
    }
}
