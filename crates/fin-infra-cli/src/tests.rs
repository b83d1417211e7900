//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use fin_infra_core::{BenchmarkMode, InMemoryCache, MerchantCache, RecurringConfig, SqliteCache};
use tempfile::NamedTempFile;

use crate::commands::{self, percent, truncate};

fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn memory_cache() -> Arc<dyn MerchantCache> {
    Arc::new(InMemoryCache::new())
}

const HISTORY_JSON: &str = r#"[
    {"id": "t1", "merchant": "NETFLIX.COM", "amount": -15.99, "date": "2024-01-15"},
    {"id": "t2", "merchant": "NETFLIX.COM", "amount": -15.99, "date": "2024-02-15"},
    {"id": "t3", "merchant": "NFLX*SUB #12345", "amount": -15.99, "date": "2024-03-15"},
    {"id": "t4", "merchant": "City Electric", "amount": "45.50", "date": "2024-01-20"},
    {"id": "t5", "merchant": "City Electric", "amount": "52.30", "date": "2024-02-20"},
    {"id": "t6", "merchant": "City Electric", "amount": "48.75", "date": "2024-03-20"}
]"#;

const HISTORY_CSV: &str = "date,merchant,amount\n\
2024-01-01,HULU LLC,17.99\n\
2024-02-01,HULU LLC,17.99\n\
2024-03-01,HULU LLC,17.99\n";

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("netflix", 10), "netflix");
    assert_eq!(truncate("a very long merchant name", 10), "a very ...");
    assert_eq!(truncate("café café café", 6), "caf...");
}

#[test]
fn test_percent() {
    assert_eq!(percent(0.925), "92.5%");
    assert_eq!(percent(0.0), "0.0%");
}

#[test]
fn test_load_config_explicit_file() {
    let file = write_temp(".toml", "[detection]\nmin_transactions = 4\n");
    let config = commands::load_config(Some(file.path())).unwrap();
    assert_eq!(config.min_transactions, 4);
}

#[test]
fn test_load_config_missing_file() {
    let result = commands::load_config(Some(Path::new("/nonexistent/recurring.toml")));
    assert!(result.is_err());
}

// ========== Detect Command Tests ==========

#[test]
fn test_read_transactions_json() {
    let file = write_temp(".json", HISTORY_JSON);
    let transactions = commands::read_transactions(file.path()).unwrap();
    assert_eq!(transactions.len(), 6);
    assert_eq!(transactions[3].merchant, "City Electric");
}

#[test]
fn test_read_transactions_csv() {
    let file = write_temp(".csv", HISTORY_CSV);
    let transactions = commands::read_transactions(file.path()).unwrap();
    assert_eq!(transactions.len(), 3);
    assert_eq!(transactions[0].id, "1");
}

#[test]
fn test_read_transactions_invalid_json() {
    let file = write_temp(".json", "{not json");
    assert!(commands::read_transactions(file.path()).is_err());

    let file = write_temp(".json", r#"[{"id": "t1", "merchant": "X"}]"#);
    assert!(commands::read_transactions(file.path()).is_err());
}

#[tokio::test]
async fn test_cmd_detect_table() {
    let file = write_temp(".json", HISTORY_JSON);
    let result = commands::cmd_detect(
        RecurringConfig::default(),
        memory_cache(),
        file.path(),
        false,
        None,
        false,
    )
    .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cmd_detect_json_with_user() {
    let file = write_temp(".csv", HISTORY_CSV);
    let result = commands::cmd_detect(
        RecurringConfig::default(),
        memory_cache(),
        file.path(),
        false,
        Some("user-42"),
        true,
    )
    .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cmd_detect_missing_file() {
    let result = commands::cmd_detect(
        RecurringConfig::default(),
        memory_cache(),
        Path::new("/nonexistent/history.json"),
        false,
        None,
        false,
    )
    .await;
    assert!(result.is_err());
}

// ========== Normalize Command Tests ==========

#[tokio::test]
async fn test_cmd_normalize() {
    let merchants = vec![
        "NFLX*SUB #12345".to_string(),
        "SQ *BLUE BOTTLE".to_string(),
        "".to_string(),
    ];
    let result =
        commands::cmd_normalize(RecurringConfig::default(), memory_cache(), &merchants, false)
            .await;
    assert!(result.is_ok());
}

// ========== Benchmark Command Tests ==========

#[test]
fn test_benchmark_modes() {
    assert_eq!(
        commands::benchmark_modes(true, false),
        vec![BenchmarkMode::PatternOnly]
    );
    assert_eq!(commands::benchmark_modes(false, true), vec![BenchmarkMode::Llm]);
    assert_eq!(
        commands::benchmark_modes(false, false),
        vec![BenchmarkMode::PatternOnly, BenchmarkMode::Llm]
    );
}

#[tokio::test]
async fn test_cmd_benchmark_pattern_only() {
    let result = commands::cmd_benchmark(
        RecurringConfig::default(),
        None,
        &[BenchmarkMode::PatternOnly],
        false,
    )
    .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cmd_benchmark_bad_dataset() {
    let file = write_temp(".json", r#"[{"merchant_name": "x"}]"#);
    let result = commands::cmd_benchmark(
        RecurringConfig::default(),
        Some(file.path()),
        &[BenchmarkMode::PatternOnly],
        true,
    )
    .await;
    assert!(result.is_err());
}

// ========== Cost Simulation Tests ==========

#[test]
fn test_simulation_options_ab_test() {
    let options = commands::simulation_options(10, 7, true, 25.0, false, 7);
    assert_eq!(options.llm_percentage, Some(25.0));
    assert!(options.enable_cache);

    let options = commands::simulation_options(10, 7, false, 25.0, true, 7);
    assert_eq!(options.llm_percentage, None);
    assert!(!options.enable_cache);
}

#[tokio::test]
async fn test_cmd_measure_costs() {
    let options = commands::simulation_options(5, 3, false, 10.0, false, 1);
    let result = commands::cmd_measure_costs(RecurringConfig::default(), options, false).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cmd_measure_costs_rejects_bad_percentage() {
    let options = commands::simulation_options(5, 3, true, 150.0, false, 1);
    let result = commands::cmd_measure_costs(RecurringConfig::default(), options, true).await;
    assert!(result.is_err());
}

// ========== Cache Command Tests ==========

#[tokio::test]
async fn test_cmd_cache_stats_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let cache = commands::open_sqlite_cache(Some(&path)).unwrap();
    cache.set("merchant_norm:acme", "{}", None).await.unwrap();

    assert!(commands::cmd_cache_stats(&cache).await.is_ok());
    assert!(commands::cmd_cache_clear(&cache).await.is_ok());

    let reopened = SqliteCache::open(&path).unwrap();
    assert_eq!(reopened.len().await.unwrap(), 0);
}

// ========== Prompts and Config Command Tests ==========

#[test]
fn test_cmd_prompts_list() {
    assert!(commands::cmd_prompts_list().is_ok());
}

#[test]
fn test_cmd_prompts_show() {
    assert!(commands::cmd_prompts_show("normalize_merchant").is_ok());
    assert!(commands::cmd_prompts_show("no_such_prompt").is_ok());
}

#[test]
fn test_cmd_config_show() {
    assert!(commands::cmd_config_show(&RecurringConfig::default()).is_ok());
    assert!(commands::cmd_config_path().is_ok());
}
