//! Fixed-amount recurring detection
//!
//! A group is a fixed recurring charge when:
//! 1. It has at least `min_transactions` transactions
//! 2. The median day gap falls in a cadence band (weekly, monthly, quarterly, annual)
//! 3. The gaps are regular (coefficient of variation within `max_interval_cv`)
//! 4. Every amount is within `amount_tolerance` of the mean
//!
//! Groups that pass 1-3 but fail 4 are left for the variable detector.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use super::{closeness, mean, regular_cadence};
use crate::config::RecurringConfig;
use crate::models::{AmountType, ExpectedAmount, MerchantGroup, PatternSource, RecurringPattern};

/// Detect a fixed-amount recurring pattern in a merchant group
pub fn detect_fixed(group: &MerchantGroup, config: &RecurringConfig) -> Option<RecurringPattern> {
    if group.len() < config.min_transactions {
        return None;
    }

    let (cadence, gap_cv) = regular_cadence(&group.day_gaps(), config.max_interval_cv)?;

    let amounts = group.amounts();
    let values: Vec<f64> = amounts.iter().filter_map(|a| a.to_f64()).collect();
    let avg = mean(&values);
    if avg <= 0.0 {
        return None;
    }

    let max_deviation = values
        .iter()
        .map(|v| (v - avg).abs() / avg)
        .fold(0.0_f64, f64::max);
    if max_deviation > config.amount_tolerance {
        debug!(
            merchant = %group.merchant,
            deviation = max_deviation,
            "Amounts vary too much for a fixed pattern"
        );
        return None;
    }

    let total: Decimal = amounts.iter().sum();
    let expected = (total / Decimal::from(amounts.len())).round_dp(2);

    let gap_score = closeness(gap_cv, config.max_interval_cv);
    let amount_score = closeness(max_deviation, config.amount_tolerance);
    let confidence = (gap_score + amount_score) / 2.0;

    let reasoning = format!(
        "{} {} charges of about ${:.2} (gap CV {:.2}, max amount deviation {:.1}%)",
        group.len(),
        cadence,
        expected,
        gap_cv,
        max_deviation * 100.0
    );

    Some(RecurringPattern::from_group(
        group,
        cadence,
        AmountType::Fixed,
        ExpectedAmount::Fixed { amount: expected },
        confidence,
        reasoning,
        PatternSource::Pattern,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cadence, Transaction};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn group(merchant: &str, rows: &[(Decimal, &str)]) -> MerchantGroup {
        let transactions = rows
            .iter()
            .enumerate()
            .map(|(i, (amount, date))| {
                Transaction::new(
                    &format!("txn_{}", i),
                    merchant,
                    *amount,
                    NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                )
            })
            .collect();
        MerchantGroup::new(merchant, transactions)
    }

    fn monthly(merchant: &str, amounts: &[Decimal]) -> MerchantGroup {
        let rows: Vec<(Decimal, String)> = amounts
            .iter()
            .enumerate()
            .map(|(i, a)| (*a, format!("2024-{:02}-15", i + 1)))
            .collect();
        let borrowed: Vec<(Decimal, &str)> = rows.iter().map(|(a, d)| (*a, d.as_str())).collect();
        group(merchant, &borrowed)
    }

    #[test]
    fn test_netflix_monthly() {
        let g = monthly("netflix", &[dec!(15.99); 6]);
        let pattern = detect_fixed(&g, &RecurringConfig::default()).unwrap();

        assert_eq!(pattern.cadence, Cadence::Monthly);
        assert_eq!(pattern.amount_type, AmountType::Fixed);
        assert_eq!(
            pattern.expected_amount,
            ExpectedAmount::Fixed {
                amount: dec!(15.99)
            }
        );
        assert_eq!(pattern.source, PatternSource::Pattern);
        assert_eq!(pattern.transactions.len(), 6);
        assert!(pattern.confidence > 0.9 && pattern.confidence <= 1.0);
    }

    #[test]
    fn test_weekly_and_annual() {
        let weekly = group(
            "gym",
            &[
                (dec!(12.00), "2024-03-01"),
                (dec!(12.00), "2024-03-08"),
                (dec!(12.00), "2024-03-15"),
                (dec!(12.00), "2024-03-22"),
            ],
        );
        assert_eq!(
            detect_fixed(&weekly, &RecurringConfig::default())
                .unwrap()
                .cadence,
            Cadence::Weekly
        );

        let annual = group(
            "domain renewal",
            &[
                (dec!(99.00), "2021-05-01"),
                (dec!(99.00), "2022-05-01"),
                (dec!(99.00), "2023-05-01"),
            ],
        );
        assert_eq!(
            detect_fixed(&annual, &RecurringConfig::default())
                .unwrap()
                .cadence,
            Cadence::Annual
        );
    }

    #[test]
    fn test_refund_sign_ignored() {
        let g = monthly("spotify", &[dec!(-10.99), dec!(-10.99), dec!(-10.99)]);
        let pattern = detect_fixed(&g, &RecurringConfig::default()).unwrap();
        assert_eq!(
            pattern.expected_amount,
            ExpectedAmount::Fixed {
                amount: dec!(10.99)
            }
        );
    }

    #[test]
    fn test_too_few_transactions() {
        let g = monthly("hulu", &[dec!(17.99), dec!(17.99)]);
        assert!(detect_fixed(&g, &RecurringConfig::default()).is_none());
    }

    #[test]
    fn test_variable_amounts_deferred() {
        let g = monthly(
            "city electric",
            &[
                dec!(45.50),
                dec!(52.30),
                dec!(48.75),
                dec!(54.20),
                dec!(58.90),
                dec!(62.40),
            ],
        );
        assert!(detect_fixed(&g, &RecurringConfig::default()).is_none());
    }

    #[test]
    fn test_small_drift_within_tolerance() {
        let g = monthly("adobe", &[dec!(20.00), dec!(20.00), dec!(20.20), dec!(20.00)]);
        let pattern = detect_fixed(&g, &RecurringConfig::default()).unwrap();
        assert!(pattern.confidence < 1.0);
    }

    #[test]
    fn test_irregular_dates_rejected() {
        let g = group(
            "random store",
            &[
                (dec!(25.00), "2024-01-05"),
                (dec!(25.00), "2024-02-12"),
                (dec!(25.00), "2024-03-20"),
                (dec!(25.00), "2024-04-08"),
                (dec!(25.00), "2024-05-15"),
                (dec!(25.00), "2024-06-02"),
            ],
        );
        assert!(detect_fixed(&g, &RecurringConfig::default()).is_none());
    }

    #[test]
    fn test_zero_amounts_rejected() {
        let g = monthly("free trial", &[dec!(0.00); 4]);
        assert!(detect_fixed(&g, &RecurringConfig::default()).is_none());
    }
}
