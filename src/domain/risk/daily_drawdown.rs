use crate::domain::errors::RiskViolation;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const BASELINE_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Persistent drawdown reference, one row per traded pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    /// Unique identifier (the traded pair)
    pub id: String,

    /// Equity the daily limit is measured against
    pub baseline_equity: Decimal,

    /// When the baseline was captured (ms)
    pub baseline_at: i64,

    /// Highest equity seen since the process first ran
    pub equity_high_water_mark: Decimal,

    /// Timestamp of last state update (ms)
    pub updated_at: i64,
}

impl RiskState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            baseline_equity: Decimal::ZERO,
            baseline_at: 0,
            equity_high_water_mark: Decimal::ZERO,
            updated_at: 0,
        }
    }

    pub fn is_baseline_stale(&self, now_ms: i64) -> bool {
        self.baseline_equity <= Decimal::ZERO || now_ms - self.baseline_at > BASELINE_TTL_MS
    }

    /// Relative drop from the baseline (0.05 = 5%)
    pub fn drawdown(&self, equity: Decimal) -> Decimal {
        if self.baseline_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.baseline_equity - equity) / self.baseline_equity).max(Decimal::ZERO)
    }
}

/// Halts trading once equity drops more than `daily_limit` below the
/// baseline captured at most 24 hours ago.
#[derive(Debug, Clone)]
pub struct DailyDrawdownGuard {
    daily_limit: Decimal,
}

impl DailyDrawdownGuard {
    pub fn new(daily_limit: Decimal) -> Self {
        Self { daily_limit }
    }

    /// Rolls the baseline forward if it is stale and checks the limit.
    ///
    /// A zero equity reading never replaces the baseline, so an empty balance
    /// response can't arm the guard at zero.
    pub fn check(
        &self,
        state: &mut RiskState,
        equity: Decimal,
        now_ms: i64,
    ) -> Result<(), RiskViolation> {
        if state.is_baseline_stale(now_ms) && equity > Decimal::ZERO {
            state.baseline_equity = equity;
            state.baseline_at = now_ms;
        }
        if equity > state.equity_high_water_mark {
            state.equity_high_water_mark = equity;
        }
        state.updated_at = now_ms;

        let threshold = state.baseline_equity * (Decimal::ONE - self.daily_limit);
        if state.baseline_equity > Decimal::ZERO && equity < threshold {
            return Err(RiskViolation::DailyDrawdown {
                equity,
                threshold,
                baseline: state.baseline_equity,
            });
        }
        Ok(())
    }
}
