use crate::domain::errors::RiskViolation;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Smallest BTC-USD order Coinbase accepts
pub const DEFAULT_MIN_ORDER_SIZE: Decimal = dec!(0.00001);

const SIZE_DECIMALS: u32 = 8;

/// Fixed-fractional sizing: lose at most `risk_per_trade` of equity if the stop is hit.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    risk_per_trade: Decimal,
    min_order_size: Decimal,
}

impl PositionSizer {
    pub fn new(risk_per_trade: Decimal, min_order_size: Decimal) -> Self {
        Self {
            risk_per_trade,
            min_order_size,
        }
    }

    pub fn risk_per_trade(&self) -> Decimal {
        self.risk_per_trade
    }

    /// Base-currency quantity for a long entry at `entry` with protective `stop`.
    ///
    /// Without a usable stop the risk fraction is applied to notional instead.
    /// The result never exceeds what `equity` can buy outright.
    pub fn size(
        &self,
        equity: Decimal,
        entry: Decimal,
        stop: Option<Decimal>,
    ) -> Result<Decimal, RiskViolation> {
        if equity <= Decimal::ZERO || entry <= Decimal::ZERO {
            return Err(RiskViolation::BelowMinimumSize {
                size: Decimal::ZERO,
                min: self.min_order_size,
            });
        }

        let risk_amount = equity * self.risk_per_trade;
        let raw = match stop {
            Some(stop) if stop < entry && stop > Decimal::ZERO => risk_amount / (entry - stop),
            _ => risk_amount / entry,
        };
        let affordable = equity / entry;

        let size = raw
            .min(affordable)
            .round_dp_with_strategy(SIZE_DECIMALS, RoundingStrategy::ToZero);

        if size < self.min_order_size {
            return Err(RiskViolation::BelowMinimumSize {
                size,
                min: self.min_order_size,
            });
        }
        Ok(size)
    }
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self::new(dec!(0.01), DEFAULT_MIN_ORDER_SIZE)
    }
}
