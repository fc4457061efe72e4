use serde::{Deserialize, Serialize};
use std::fmt;

/// Candle intervals supported by the Coinbase Exchange candles endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Timeframe {
    OneMin,
    FiveMin,
    #[default]
    FifteenMin,
    OneHour,
    SixHour,
    OneDay,
}

impl Timeframe {
    /// Returns the duration of this timeframe in minutes
    pub fn to_minutes(&self) -> usize {
        match self {
            Timeframe::OneMin => 1,
            Timeframe::FiveMin => 5,
            Timeframe::FifteenMin => 15,
            Timeframe::OneHour => 60,
            Timeframe::SixHour => 360,
            Timeframe::OneDay => 1440,
        }
    }

    /// Returns the duration in seconds
    pub fn to_seconds(&self) -> i64 {
        (self.to_minutes() * 60) as i64
    }

    pub fn to_millis(&self) -> i64 {
        self.to_seconds() * 1000
    }

    /// Coinbase `granularity` query parameter (seconds)
    pub fn granularity(&self) -> i64 {
        self.to_seconds()
    }

    /// Short label stored alongside candles ("15m")
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::OneMin => "1m",
            Timeframe::FiveMin => "5m",
            Timeframe::FifteenMin => "15m",
            Timeframe::OneHour => "1h",
            Timeframe::SixHour => "6h",
            Timeframe::OneDay => "1d",
        }
    }

    /// Returns the start timestamp (in ms) of the period containing `timestamp_ms`.
    ///
    /// Every Coinbase granularity divides a day evenly, so plain modulo
    /// arithmetic also lands daily candles on midnight UTC.
    pub fn period_start(&self, timestamp_ms: i64) -> i64 {
        let period_ms = self.to_millis();
        timestamp_ms - timestamp_ms.rem_euclid(period_ms)
    }

    /// True once the candle opening at `open_ms` has closed at `now_ms`
    pub fn is_closed(&self, open_ms: i64, now_ms: i64) -> bool {
        open_ms + self.to_millis() <= now_ms
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
