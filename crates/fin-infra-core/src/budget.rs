//! LLM spend tracking with daily and monthly caps
//!
//! `BudgetTracker` is shared via `Arc` by every component that pays for LLM
//! calls. Both counters and the `exceeded` flag live behind one lock, so a
//! cost is always added to the daily and monthly totals together.
//!
//! The tracker has no clock: rolling the day or month over is the caller's
//! job (`reset_daily_budget` / `reset_monthly_budget`).

use std::sync::{Mutex, MutexGuard};

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RecurringConfig;

/// Mutable budget counters
#[derive(Debug, Clone)]
struct BudgetState {
    daily_cost: Decimal,
    monthly_cost: Decimal,
    daily_limit: Decimal,
    monthly_limit: Decimal,
    exceeded: bool,
}

/// Read-only snapshot of the budget
///
/// `*_remaining` is the raw difference `limit - cost` and goes negative after
/// an overshoot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    pub daily_cost: Decimal,
    pub daily_limit: Decimal,
    pub daily_remaining: Decimal,
    pub monthly_cost: Decimal,
    pub monthly_limit: Decimal,
    pub monthly_remaining: Decimal,
    pub exceeded: bool,
}

/// Shared daily/monthly LLM budget
#[derive(Debug)]
pub struct BudgetTracker {
    state: Mutex<BudgetState>,
}

impl BudgetTracker {
    pub fn new(daily_limit: Decimal, monthly_limit: Decimal) -> Self {
        Self {
            state: Mutex::new(BudgetState {
                daily_cost: Decimal::ZERO,
                monthly_cost: Decimal::ZERO,
                daily_limit,
                monthly_limit,
                exceeded: false,
            }),
        }
    }

    pub fn from_config(config: &RecurringConfig) -> Self {
        Self::new(config.max_cost_per_day, config.max_cost_per_month)
    }

    fn lock(&self) -> MutexGuard<'_, BudgetState> {
        // Counters are plain decimals; a panic elsewhere cannot leave them torn
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a completed call's cost to both counters
    ///
    /// The call that pushes spend over a limit has already happened; only
    /// later calls are blocked.
    pub fn record_cost(&self, amount: Decimal) {
        let mut state = self.lock();
        state.daily_cost += amount;
        state.monthly_cost += amount;

        let over = state.daily_cost > state.daily_limit || state.monthly_cost > state.monthly_limit;
        if over && !state.exceeded {
            warn!(
                daily_cost = %state.daily_cost,
                daily_limit = %state.daily_limit,
                monthly_cost = %state.monthly_cost,
                monthly_limit = %state.monthly_limit,
                "LLM budget exceeded, further calls disabled until reset"
            );
        }
        state.exceeded = over;

        debug!(
            amount = %amount,
            daily_cost = %state.daily_cost,
            monthly_cost = %state.monthly_cost,
            "Recorded LLM cost"
        );
    }

    /// Zero the daily counter and clear the exceeded flag
    pub fn reset_daily_budget(&self) {
        let mut state = self.lock();
        state.daily_cost = Decimal::ZERO;
        state.exceeded = false;
        info!(monthly_cost = %state.monthly_cost, "Daily LLM budget reset");
    }

    /// Zero the monthly counter and clear the exceeded flag
    pub fn reset_monthly_budget(&self) {
        let mut state = self.lock();
        state.monthly_cost = Decimal::ZERO;
        state.exceeded = false;
        info!(daily_cost = %state.daily_cost, "Monthly LLM budget reset");
    }

    /// Whether LLM calls are currently blocked
    pub fn is_exceeded(&self) -> bool {
        self.lock().exceeded
    }

    pub fn get_budget_status(&self) -> BudgetStatus {
        let state = self.lock();
        BudgetStatus {
            daily_cost: state.daily_cost,
            daily_limit: state.daily_limit,
            daily_remaining: state.daily_limit - state.daily_cost,
            monthly_cost: state.monthly_cost,
            monthly_limit: state.monthly_limit,
            monthly_remaining: state.monthly_limit - state.monthly_cost,
            exceeded: state.exceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_record_cost_accumulates() {
        let budget = BudgetTracker::new(dec!(0.10), dec!(2.00));
        for _ in 0..5 {
            budget.record_cost(dec!(0.0001));
        }

        let status = budget.get_budget_status();
        assert_eq!(status.daily_cost, dec!(0.0005));
        assert_eq!(status.monthly_cost, dec!(0.0005));
        assert!(!status.exceeded);
    }

    #[test]
    fn test_crossing_call_completes_then_blocks() {
        let budget = BudgetTracker::new(dec!(0.10), dec!(2.00));
        budget.record_cost(dec!(0.09));
        assert!(!budget.is_exceeded());

        budget.record_cost(dec!(0.02));
        assert!(budget.is_exceeded());
    }

    #[test]
    fn test_exactly_at_limit_is_not_exceeded() {
        let budget = BudgetTracker::new(dec!(0.10), dec!(2.00));
        budget.record_cost(dec!(0.10));
        assert!(!budget.is_exceeded());
    }

    #[test]
    fn test_monthly_limit_exceeds() {
        let budget = BudgetTracker::new(dec!(10.00), dec!(0.05));
        budget.record_cost(dec!(0.06));
        assert!(budget.is_exceeded());
    }

    #[test]
    fn test_reset_daily_keeps_monthly() {
        let budget = BudgetTracker::new(dec!(0.10), dec!(2.00));
        budget.record_cost(dec!(0.15));
        assert!(budget.is_exceeded());

        budget.reset_daily_budget();
        let status = budget.get_budget_status();
        assert_eq!(status.daily_cost, Decimal::ZERO);
        assert_eq!(status.monthly_cost, dec!(0.15));
        assert!(!status.exceeded);
    }

    #[test]
    fn test_reset_monthly_clears_flag() {
        let budget = BudgetTracker::new(dec!(10.00), dec!(0.05));
        budget.record_cost(dec!(0.06));
        assert!(budget.is_exceeded());

        budget.reset_monthly_budget();
        let status = budget.get_budget_status();
        assert_eq!(status.monthly_cost, Decimal::ZERO);
        assert_eq!(status.daily_cost, dec!(0.06));
        assert!(!status.exceeded);
    }

    #[test]
    fn test_remaining_goes_negative() {
        let budget = BudgetTracker::new(dec!(0.10), dec!(2.00));
        budget.record_cost(dec!(0.12));

        let status = budget.get_budget_status();
        assert_eq!(status.daily_remaining, dec!(-0.02));
        assert_eq!(status.monthly_remaining, dec!(1.88));
    }

    #[test]
    fn test_concurrent_records_not_lost() {
        let budget = Arc::new(BudgetTracker::new(dec!(100), dec!(100)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let budget = Arc::clone(&budget);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        budget.record_cost(dec!(0.0001));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let status = budget.get_budget_status();
        assert_eq!(status.daily_cost, dec!(0.2000));
        assert_eq!(status.monthly_cost, dec!(0.2000));
    }
}
