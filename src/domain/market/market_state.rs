use crate::domain::trading::types::Candle;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse label for the latest bar relative to the bars before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketState {
    /// Range did not expand
    Consolidation,
    /// Range expansion with a new high and a higher close
    Up,
    /// Range expansion with a new low and a lower close
    Down,
    /// Range expansion without a clean direction
    Chaos,
    /// Not enough bars to judge
    Unknown,
}

impl MarketState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketState::Consolidation => "consolidation",
            MarketState::Up => "up",
            MarketState::Down => "down",
            MarketState::Chaos => "chaos",
            MarketState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Labels the last candle against the `lookback` candles preceding it
#[derive(Debug, Clone)]
pub struct MarketStateLabeler {
    lookback: usize,
}

impl MarketStateLabeler {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback: lookback.max(1),
        }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn label(&self, candles: &[Candle]) -> MarketState {
        if candles.len() < self.lookback + 1 {
            return MarketState::Unknown;
        }

        let last = &candles[candles.len() - 1];
        let prev = &candles[candles.len() - 2];
        let window = &candles[candles.len() - 1 - self.lookback..candles.len() - 1];

        let prior_high = window.iter().map(|c| c.high).max().unwrap_or(Decimal::ZERO);
        let prior_low = window.iter().map(|c| c.low).min().unwrap_or(Decimal::ZERO);
        let avg_range =
            window.iter().map(Candle::range).sum::<Decimal>() / Decimal::from(window.len());

        let expanded = last.range() > avg_range;
        let new_high = last.high > prior_high;
        let new_low = last.low < prior_low;

        if !expanded {
            MarketState::Consolidation
        } else if new_high && last.close > prev.close {
            MarketState::Up
        } else if new_low && last.close < prev.close {
            MarketState::Down
        } else {
            MarketState::Chaos
        }
    }
}

impl Default for MarketStateLabeler {
    fn default() -> Self {
        Self::new(20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn bar(ts: i64, o: i64, h: i64, l: i64, c: i64) -> Candle {
        Candle {
            pair: "BTC-USD".to_string(),
            timestamp: ts,
            open: Decimal::from(o),
            high: Decimal::from(h),
            low: Decimal::from(l),
            close: Decimal::from(c),
            volume: Decimal::ONE,
        }
    }

    fn rising(n: i64) -> Vec<Candle> {
        (0..n)
            .map(|i| bar(i * 60_000, 100 + i, 101 + i, 99 + i, 100 + i))
            .collect()
    }

    #[test]
    fn test_flat_bars_are_consolidation() {
        let candles: Vec<Candle> = (0..21).map(|i| bar(i * 60_000, 100, 101, 99, 100)).collect();
        assert_eq!(
            MarketStateLabeler::default().label(&candles),
            MarketState::Consolidation
        );
    }

    #[test]
    fn test_range_expansion_to_new_high_is_up() {
        let mut candles = rising(20);
        candles.push(bar(20 * 60_000, 120, 125, 118, 124));
        assert_eq!(MarketStateLabeler::default().label(&candles), MarketState::Up);
    }

    #[test]
    fn test_range_expansion_to_new_low_is_down() {
        let mut candles: Vec<Candle> = (0..20)
            .map(|i| bar(i * 60_000, 200 - i, 201 - i, 199 - i, 200 - i))
            .collect();
        candles.push(bar(20 * 60_000, 180, 182, 170, 171));
        assert_eq!(MarketStateLabeler::default().label(&candles), MarketState::Down);
    }

    #[test]
    fn test_outside_bar_takes_direction_from_close() {
        let flat = || -> Vec<Candle> {
            (0..20).map(|i| bar(i * 60_000, 100, 101, 99, 100)).collect()
        };

        let mut candles = flat();
        candles.push(bar(20 * 60_000, 100, 110, 90, 101));
        assert_eq!(MarketStateLabeler::default().label(&candles), MarketState::Up);

        let mut candles = flat();
        candles.push(bar(20 * 60_000, 100, 110, 90, 99));
        assert_eq!(MarketStateLabeler::default().label(&candles), MarketState::Down);
    }

    #[test]
    fn test_expansion_without_new_extreme_is_chaos() {
        // Wide prior range, last bar expands past the average but stays inside it
        let mut candles: Vec<Candle> = (0..20)
            .map(|i| {
                if i == 0 {
                    bar(0, 100, 130, 70, 100)
                } else {
                    bar(i * 60_000, 100, 101, 99, 100)
                }
            })
            .collect();
        candles.push(bar(20 * 60_000, 100, 110, 90, 105));
        assert_eq!(MarketStateLabeler::default().label(&candles), MarketState::Chaos);
    }

    #[test]
    fn test_new_high_closing_lower_is_chaos() {
        let mut candles: Vec<Candle> = (0..20).map(|i| bar(i * 60_000, 100, 101, 99, 100)).collect();
        candles.push(bar(20 * 60_000, 104, 108, 99, 99));
        assert_eq!(MarketStateLabeler::default().label(&candles), MarketState::Chaos);
    }

    #[test]
    fn test_short_history_is_unknown() {
        assert_eq!(
            MarketStateLabeler::default().label(&rising(20)),
            MarketState::Unknown
        );
    }
}
