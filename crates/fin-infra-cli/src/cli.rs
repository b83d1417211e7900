//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// fin-infra - Find the recurring charges in a transaction history
#[derive(Parser)]
#[command(name = "fin-infra")]
#[command(about = "Recurring transaction detection with a cost-bounded LLM layer", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to the data-dir override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Merchant cache database (defaults to <data dir>/fin-infra/cache.db)
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect recurring charges in a transaction history
    Detect {
        /// JSON array or CSV file of transactions
        #[arg(short, long)]
        file: PathBuf,

        /// Enable the LLM layer regardless of configuration
        #[arg(long)]
        llm: bool,

        /// User id for A/B routing (stable bucket per user)
        #[arg(short, long)]
        user: Option<String>,

        /// Print patterns as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the canonical name for raw merchant strings
    Normalize {
        /// Raw merchant strings, e.g. "NFLX*SUB #12345"
        #[arg(required = true)]
        merchants: Vec<String>,

        /// Allow the LLM fallback for unrecognized merchants
        #[arg(long)]
        llm: bool,
    },

    /// Measure detection accuracy against a labeled dataset
    Benchmark {
        /// Labeled dataset (JSON); defaults to the built-in cases
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Only run the pattern-only detector
        #[arg(long, conflicts_with = "llm_only")]
        pattern_only: bool,

        /// Only run the LLM-enabled detector
        #[arg(long)]
        llm_only: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Simulate LLM spend and cache effectiveness for a user population
    MeasureCosts {
        /// Simulated users
        #[arg(long, default_value = "100")]
        users: usize,

        /// Simulated days
        #[arg(long, default_value = "30")]
        days: u32,

        /// Route only --llm-percentage of users to the LLM layer
        #[arg(long)]
        ab_test: bool,

        /// Share of users routed to the LLM layer when --ab-test is set
        #[arg(long, default_value = "10.0")]
        llm_percentage: f64,

        /// Disable the normalization cache
        #[arg(long)]
        no_cache: bool,

        /// Seed for simulated traffic
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the merchant normalization cache
    Cache {
        #[command(subcommand)]
        action: Option<CacheAction>,
    },

    /// Manage AI prompts
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },

    /// Show the resolved configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show entry count and location
    Stats,
    /// Remove every cached normalization
    Clear,
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all prompts and their override status
    List,
    /// Show the content of a specific prompt
    Show {
        /// Prompt ID (e.g. normalize_merchant)
        prompt_id: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the resolved configuration
    Show,
    /// Print the override file location
    Path,
}
