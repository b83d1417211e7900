//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `benchmark` - Accuracy benchmark over labeled cases
//! - `cache` - Merchant cache stats and clearing
//! - `config` - Resolved configuration display
//! - `costs` - LLM cost simulation
//! - `detect` - Recurring detection over a transaction file
//! - `normalize` - Merchant normalization lookups
//! - `prompts` - Prompt library listing
//!
//! Shared setup (configuration, cache, detector construction) lives here.

pub mod benchmark;
pub mod cache;
pub mod config;
pub mod costs;
pub mod detect;
pub mod normalize;
pub mod prompts;

// Re-export command functions for main.rs
pub use benchmark::*;
pub use cache::*;
pub use config::*;
pub use costs::*;
pub use detect::*;
pub use normalize::*;
pub use prompts::*;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fin_infra_core::cache::default_cache_path;
use fin_infra_core::{InMemoryCache, MerchantCache, RecurringConfig, RecurringDetector, SqliteCache};

/// Load configuration from `--config`, or the default override/embedded file
pub fn load_config(path: Option<&Path>) -> Result<RecurringConfig> {
    match path {
        Some(path) => RecurringConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => RecurringConfig::load().context("Failed to load config"),
    }
}

/// Open the persistent merchant cache at `--cache` or the default location
pub fn open_sqlite_cache(path: Option<&Path>) -> Result<SqliteCache> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_cache_path().context("No data directory available; pass --cache")?,
    };
    SqliteCache::open(&path)
        .with_context(|| format!("Failed to open cache at {}", path.display()))
}

/// Cache for detection commands, falling back to memory if no data dir exists
pub fn open_cache(path: Option<&Path>) -> Result<Arc<dyn MerchantCache>> {
    if path.is_none() && default_cache_path().is_none() {
        println!("   ⚠️  No data directory; normalizations will not be cached");
        return Ok(Arc::new(InMemoryCache::new()));
    }
    Ok(Arc::new(open_sqlite_cache(path)?))
}

/// Build a detector, enabling the LLM layer when asked or configured
pub fn build_detector(
    config: RecurringConfig,
    cache: Arc<dyn MerchantCache>,
    llm: bool,
) -> Result<RecurringDetector> {
    let config = if llm { config.with_llm(true) } else { config };
    let llm_enabled = config.enable_llm;
    let provider = config.llm_provider.clone();

    let detector = RecurringDetector::from_config(config, cache)
        .context("Failed to set up detector (check LLM provider credentials)")?;

    if llm_enabled {
        println!("   🤖 LLM layer enabled ({})", provider);
    } else {
        println!("   💡 Tip: pass --llm (or set FIN_INFRA_ENABLE_LLM=1) for variable/seasonal detection");
    }
    Ok(detector)
}

/// Format a 0-1 ratio as a percentage
pub fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
