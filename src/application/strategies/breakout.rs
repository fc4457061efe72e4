use super::traits::{AnalysisContext, Signal, TradingStrategy};
use crate::application::indicators::atr;
use crate::domain::errors::StrategyError;
use crate::domain::market::market_state::MarketState;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

/// State-driven breakout strategy
///
/// Enters when the labeller reports an `Up` expansion bar. The protective stop
/// sits one ATR below the highest high of the `lookback_period` bars preceding
/// the breakout bar. Exits when a bar trades through the stop (filled at the
/// stop) or the market turns `Down`.
#[derive(Debug, Clone)]
pub struct BreakoutStrategy {
    pub lookback_period: usize,
    pub atr_period: usize,
}

impl BreakoutStrategy {
    pub fn new(lookback_period: usize, atr_period: usize) -> Self {
        Self {
            lookback_period,
            atr_period,
        }
    }

    /// Highest high of the bars before the last one
    fn prior_high(&self, ctx: &AnalysisContext) -> Option<Decimal> {
        let n = ctx.candles.len();
        if n < self.lookback_period + 1 {
            return None;
        }
        ctx.candles[n - 1 - self.lookback_period..n - 1]
            .iter()
            .map(|c| c.high)
            .max()
    }

    pub fn initial_stop(&self, ctx: &AnalysisContext) -> Result<Decimal, StrategyError> {
        let prior_high = self
            .prior_high(ctx)
            .ok_or(StrategyError::InsufficientData {
                need: self.min_candles(),
                have: ctx.candles.len(),
            })?;
        let atr = atr(&ctx.candles, self.atr_period)?;
        let atr = Decimal::from_f64(atr)
            .ok_or_else(|| StrategyError::Indicator(format!("ATR not representable: {}", atr)))?;
        Ok(prior_high - atr)
    }
}

impl Default for BreakoutStrategy {
    fn default() -> Self {
        Self {
            lookback_period: 20,
            atr_period: 14,
        }
    }
}

impl TradingStrategy for BreakoutStrategy {
    fn analyze(&self, ctx: &AnalysisContext) -> Result<Option<Signal>, StrategyError> {
        let Some(last) = ctx.last_candle() else {
            return Err(StrategyError::InsufficientData {
                need: self.min_candles(),
                have: 0,
            });
        };

        if let Some(position) = &ctx.position {
            if let Some(stop) = position.stop
                && last.low <= stop
            {
                return Ok(Some(
                    Signal::sell(format!("Stop hit: low {} <= stop {}", last.low, stop))
                        .with_price(stop),
                ));
            }
            if ctx.state == MarketState::Down {
                return Ok(Some(Signal::sell("Market turned down")));
            }
            return Ok(None);
        }

        if ctx.state != MarketState::Up {
            return Ok(None);
        }

        let stop = self.initial_stop(ctx)?;
        if stop >= ctx.current_price {
            tracing::debug!(
                "Breakout [{}]: stop {} not below price {}, skipping",
                ctx.pair,
                stop,
                ctx.current_price
            );
            return Ok(None);
        }

        Ok(Some(
            Signal::buy(format!(
                "Breakout: close {} with stop {}",
                ctx.current_price, stop
            ))
            .with_stop(stop),
        ))
    }

    fn name(&self) -> &str {
        "Breakout"
    }

    fn min_candles(&self) -> usize {
        self.lookback_period + 1
    }
}
