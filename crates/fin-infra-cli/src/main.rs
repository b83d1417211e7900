//! fin-infra CLI - Recurring transaction detection
//!
//! Usage:
//!   fin-infra detect --file history.json     Detect recurring charges
//!   fin-infra normalize "NFLX*SUB #123"      Show canonical merchant names
//!   fin-infra benchmark --pattern-only       Measure detection accuracy
//!   fin-infra measure-costs --users 1000     Simulate LLM spend

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Detect {
            file,
            llm,
            user,
            json,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let cache = commands::open_cache(cli.cache.as_deref())?;
            commands::cmd_detect(config, cache, &file, llm, user.as_deref(), json).await
        }
        Commands::Normalize { merchants, llm } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let cache = commands::open_cache(cli.cache.as_deref())?;
            commands::cmd_normalize(config, cache, &merchants, llm).await
        }
        Commands::Benchmark {
            dataset,
            pattern_only,
            llm_only,
            json,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let modes = commands::benchmark_modes(pattern_only, llm_only);
            commands::cmd_benchmark(config, dataset.as_deref(), &modes, json).await
        }
        Commands::MeasureCosts {
            users,
            days,
            ab_test,
            llm_percentage,
            no_cache,
            seed,
            json,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let options = commands::simulation_options(
                users,
                days,
                ab_test,
                llm_percentage,
                no_cache,
                seed,
            );
            commands::cmd_measure_costs(config, options, json).await
        }
        Commands::Cache { action } => {
            let cache = commands::open_sqlite_cache(cli.cache.as_deref())?;
            match action {
                None | Some(CacheAction::Stats) => commands::cmd_cache_stats(&cache).await,
                Some(CacheAction::Clear) => commands::cmd_cache_clear(&cache).await,
            }
        }
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
        },
        Commands::Config { action } => match action {
            None | Some(ConfigAction::Show) => {
                let config = commands::load_config(cli.config.as_deref())?;
                commands::cmd_config_show(&config)
            }
            Some(ConfigAction::Path) => commands::cmd_config_path(),
        },
    }
}
