use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while assembling the runtime configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable {name} (required for live trading)")]
    MissingCredential { name: &'static str },

    #[error("Risk per trade must be in (0, 1], got {value}")]
    InvalidRisk { value: Decimal },

    #[error("Daily risk limit must be in (0, 1], got {value}")]
    InvalidDailyRisk { value: Decimal },

    #[error("Invalid trading pair '{pair}': expected BASE-QUOTE, e.g. BTC-USD")]
    InvalidPair { pair: String },

    #[error("Invalid paper equity: {value}")]
    InvalidPaperEquity { value: String },
}

/// Errors reported by the exchange adapter
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Exchange rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    #[error("Invalid API secret: {reason}")]
    InvalidSecret { reason: String },
}

/// Errors raised by indicator and strategy evaluation
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Not enough candles: need {need}, have {have}")]
    InsufficientData { need: usize, have: usize },

    #[error("Series misaligned: {fast} fast points vs {slow} slow points")]
    MisalignedSeries { fast: usize, slow: usize },

    #[error("Indicator error: {0}")]
    Indicator(String),
}

/// Errors raised by risk rules
#[derive(Debug, Error)]
pub enum RiskViolation {
    #[error("Daily drawdown limit breached: equity {equity} < {threshold} (baseline {baseline})")]
    DailyDrawdown {
        equity: Decimal,
        threshold: Decimal,
        baseline: Decimal,
    },

    #[error("Position size {size} below exchange minimum {min}")]
    BelowMinimumSize { size: Decimal, min: Decimal },
}
