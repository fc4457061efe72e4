use super::traits::{AnalysisContext, Signal, TradingStrategy};
use crate::application::indicators::{CrossDirection, closes, crosses, ema_series};
use crate::domain::errors::StrategyError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Fast/slow EMA crossover with fixed percentage stop-loss and take-profit
///
/// Entry: fast EMA closes above slow EMA after being at or below it.
/// Exit, whichever comes first:
/// - fast EMA crosses below slow EMA
/// - close at or below entry * (1 - stop_loss_pct)
/// - close at or above entry * (1 + take_profit_pct)
#[derive(Debug, Clone)]
pub struct EmaCrossoverStrategy {
    pub fast_period: usize,
    pub slow_period: usize,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
}

impl EmaCrossoverStrategy {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        stop_loss_pct: Decimal,
        take_profit_pct: Decimal,
    ) -> Self {
        Self {
            fast_period,
            slow_period,
            stop_loss_pct,
            take_profit_pct,
        }
    }
}

impl Default for EmaCrossoverStrategy {
    fn default() -> Self {
        Self::new(20, 50, dec!(0.02), dec!(0.02))
    }
}

impl TradingStrategy for EmaCrossoverStrategy {
    fn analyze(&self, ctx: &AnalysisContext) -> Result<Option<Signal>, StrategyError> {
        if ctx.candles.len() < self.min_candles() {
            return Err(StrategyError::InsufficientData {
                need: self.min_candles(),
                have: ctx.candles.len(),
            });
        }

        let prices = closes(&ctx.candles);
        let fast = ema_series(&prices, self.fast_period)?;
        let slow = ema_series(&prices, self.slow_period)?;
        let price = ctx.current_price;

        if let Some(position) = &ctx.position {
            let stop = position
                .stop
                .unwrap_or(position.entry_price * (Decimal::ONE - self.stop_loss_pct));
            let target = position
                .take_profit
                .unwrap_or(position.entry_price * (Decimal::ONE + self.take_profit_pct));

            if crosses(&fast, &slow, CrossDirection::Down)? {
                return Ok(Some(Signal::sell(format!(
                    "Bearish crossover (EMA{}={:.2} < EMA{}={:.2})",
                    self.fast_period,
                    fast[fast.len() - 1],
                    self.slow_period,
                    slow[slow.len() - 1]
                ))));
            }
            if price <= stop {
                return Ok(Some(Signal::sell(format!(
                    "Stop-loss: close {} <= stop {}",
                    price, stop
                ))));
            }
            if price >= target {
                return Ok(Some(Signal::sell(format!(
                    "Take-profit: close {} >= target {}",
                    price, target
                ))));
            }
            return Ok(None);
        }

        if crosses(&fast, &slow, CrossDirection::Up)? {
            tracing::debug!(
                "EmaCrossover [{}]: bullish crossover at {}",
                ctx.pair,
                price
            );
            return Ok(Some(
                Signal::buy(format!(
                    "Bullish crossover (EMA{}={:.2} > EMA{}={:.2})",
                    self.fast_period,
                    fast[fast.len() - 1],
                    self.slow_period,
                    slow[slow.len() - 1]
                ))
                .with_stop(price * (Decimal::ONE - self.stop_loss_pct))
                .with_take_profit(price * (Decimal::ONE + self.take_profit_pct)),
            ));
        }

        Ok(None)
    }

    fn name(&self) -> &str {
        "EmaCrossover"
    }

    fn min_candles(&self) -> usize {
        self.slow_period.max(self.fast_period) + 1
    }
}
