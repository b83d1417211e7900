//! Recurring pattern detectors
//!
//! - `fixed`: regular cadence with a near-constant amount (subscriptions)
//! - `variable`: regular cadence with a varying amount (utilities, carriers),
//!   decided by the LLM or by a deterministic heuristic
//!
//! Both share the cadence bands and dispersion helpers below.

pub mod fixed;
pub mod variable;

pub use fixed::detect_fixed;
pub use variable::{detect_variable_heuristic, VariableDetector};

use crate::models::Cadence;

/// Accepted median day gaps per cadence, inclusive
const CADENCE_BANDS: &[(Cadence, i64, i64)] = &[
    (Cadence::Weekly, 5, 9),
    (Cadence::Monthly, 25, 34),
    (Cadence::Quarterly, 83, 97),
    (Cadence::Annual, 355, 375),
];

/// Map a median day gap onto a cadence band
pub fn classify_cadence(median_gap: f64) -> Option<Cadence> {
    CADENCE_BANDS
        .iter()
        .find(|(_, low, high)| median_gap >= *low as f64 && median_gap <= *high as f64)
        .map(|(cadence, _, _)| *cadence)
}

/// Calculate median of a slice
pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation over the mean (0.0 for an empty or zero-mean series)
pub(crate) fn coefficient_of_variation(values: &[f64]) -> f64 {
    let avg = mean(values);
    if values.is_empty() || avg == 0.0 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt() / avg.abs()
}

/// Score in [0, 1]: 1.0 at zero, falling linearly to 0.0 at `limit`
pub(crate) fn closeness(value: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        return 0.0;
    }
    (1.0 - value / limit).clamp(0.0, 1.0)
}

/// Cadence and gap regularity of a date series, if it has one
pub(crate) fn regular_cadence(gaps: &[i64], max_interval_cv: f64) -> Option<(Cadence, f64)> {
    if gaps.is_empty() {
        return None;
    }
    let gaps: Vec<f64> = gaps.iter().map(|g| *g as f64).collect();
    let cadence = classify_cadence(median(&gaps))?;
    let cv = coefficient_of_variation(&gaps);
    if cv > max_interval_cv {
        return None;
    }
    Some((cadence, cv))
}
