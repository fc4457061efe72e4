//! Indicator helpers over stored candles.
//!
//! Price math runs in f64 through the `ta` crate; results are converted back
//! to `Decimal` at the strategy boundary.

use crate::domain::errors::StrategyError;
use crate::domain::trading::types::Candle;
use rust_decimal::prelude::ToPrimitive;
use ta::Next;
use ta::indicators::{AverageTrueRange, ExponentialMovingAverage};

impl ta::Open for Candle {
    fn open(&self) -> f64 {
        self.open.to_f64().unwrap_or(0.0)
    }
}

impl ta::High for Candle {
    fn high(&self) -> f64 {
        self.high.to_f64().unwrap_or(0.0)
    }
}

impl ta::Low for Candle {
    fn low(&self) -> f64 {
        self.low.to_f64().unwrap_or(0.0)
    }
}

impl ta::Close for Candle {
    fn close(&self) -> f64 {
        self.close.to_f64().unwrap_or(0.0)
    }
}

impl ta::Volume for Candle {
    fn volume(&self) -> f64 {
        self.volume.to_f64().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossDirection {
    Up,
    Down,
}

pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(ta::Close::close).collect()
}

/// Exponential moving average seeded with the first value, alpha = 2 / (period + 1).
pub fn ema_series(values: &[f64], period: usize) -> Result<Vec<f64>, StrategyError> {
    let mut ema = ExponentialMovingAverage::new(period)
        .map_err(|e| StrategyError::Indicator(format!("{:?}", e)))?;
    Ok(values.iter().map(|v| ema.next(*v)).collect())
}

/// Latest Average True Range over the whole series
pub fn atr(candles: &[Candle], period: usize) -> Result<f64, StrategyError> {
    if candles.is_empty() {
        return Err(StrategyError::InsufficientData { need: 1, have: 0 });
    }
    let mut indicator = AverageTrueRange::new(period)
        .map_err(|e| StrategyError::Indicator(format!("{:?}", e)))?;
    let mut last = 0.0;
    for candle in candles {
        last = indicator.next(candle);
    }
    Ok(last)
}

/// True when the two series crossed on the latest point.
pub fn crosses(
    fast: &[f64],
    slow: &[f64],
    direction: CrossDirection,
) -> Result<bool, StrategyError> {
    if fast.len() != slow.len() {
        return Err(StrategyError::MisalignedSeries {
            fast: fast.len(),
            slow: slow.len(),
        });
    }
    if fast.len() < 2 {
        return Ok(false);
    }

    let n = fast.len();
    let (f_prev, f_last) = (fast[n - 2], fast[n - 1]);
    let (s_prev, s_last) = (slow[n - 2], slow[n - 1]);

    Ok(match direction {
        CrossDirection::Up => f_last > s_last && f_prev <= s_prev,
        CrossDirection::Down => f_last < s_last && f_prev >= s_prev,
    })
}
