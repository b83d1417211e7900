//! Merchant cache command implementations

use anyhow::{Context, Result};
use fin_infra_core::{MerchantCache, SqliteCache};

pub async fn cmd_cache_stats(cache: &SqliteCache) -> Result<()> {
    let purged = cache.purge_expired().context("Failed to purge expired entries")?;
    let entries = cache.len().await.context("Failed to count cache entries")?;

    println!("🗄️  Merchant cache: {}", cache.path().display());
    println!("   Entries: {}", entries);
    if purged > 0 {
        println!("   Purged {} expired entries", purged);
    }
    Ok(())
}

pub async fn cmd_cache_clear(cache: &SqliteCache) -> Result<()> {
    let entries = cache.len().await.context("Failed to count cache entries")?;
    cache.clear().await.context("Failed to clear cache")?;
    println!("✅ Cleared {} cached normalizations", entries);
    Ok(())
}
