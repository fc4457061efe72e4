//! Runtime configuration.
//!
//! Trading parameters come from the command line (`CliArgs`); Coinbase
//! credentials and a few deployment overrides come from the environment
//! (a `.env` file is loaded first by the binary).

mod cli;
mod coinbase_config;

pub use cli::{CliArgs, LogLevel};
pub use coinbase_config::{
    API_KEY_VAR, API_PASSPHRASE_VAR, API_SECRET_VAR, CoinbaseConfig, CoinbaseCredentials,
    DEFAULT_API_URL,
};

use crate::application::strategies::StrategyMode;
use crate::domain::errors::ConfigError;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::trading::types::{TradingMode, split_pair};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::time::Duration;

/// Delay before retrying after a failed cycle
pub const ERROR_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: TradingMode,
    pub risk_per_trade: Decimal,
    pub daily_risk: Decimal,
    pub log_level: LogLevel,
    pub strategy: StrategyMode,
    pub pair: String,
    pub timeframe: Timeframe,
    pub database_url: String,
    pub poll_interval: Duration,
    pub run_once: bool,
    pub coinbase: CoinbaseConfig,
    /// Starting balance (quote currency) for paper trading
    pub paper_equity: Decimal,
    /// Candles backfilled on an empty database
    pub bootstrap_candles: usize,
    pub observability_enabled: bool,
    pub observability_interval: u64,
}

impl Config {
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        Self::resolve(args, |name| std::env::var(name).ok())
    }

    /// Builds and validates the configuration, reading environment values through `env`.
    pub fn resolve<F>(args: CliArgs, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = if args.paper {
            TradingMode::Paper
        } else {
            TradingMode::Live
        };

        if args.risk <= Decimal::ZERO || args.risk > Decimal::ONE {
            return Err(ConfigError::InvalidRisk { value: args.risk });
        }
        if args.daily_risk <= Decimal::ZERO || args.daily_risk > Decimal::ONE {
            return Err(ConfigError::InvalidDailyRisk {
                value: args.daily_risk,
            });
        }

        let pair = args.pair.trim().to_uppercase();
        if split_pair(&pair).is_none() {
            return Err(ConfigError::InvalidPair { pair: args.pair });
        }

        let credentials = match CoinbaseCredentials::from_lookup(&env) {
            Ok(creds) => Some(creds),
            Err(e) if mode.is_live() => return Err(e),
            Err(_) => None,
        };

        let paper_equity = match env("COINBOT_PAPER_EQUITY") {
            Some(raw) => Decimal::from_str(raw.trim())
                .ok()
                .filter(|v| *v > Decimal::ZERO)
                .ok_or(ConfigError::InvalidPaperEquity { value: raw })?,
            None => dec!(10000),
        };

        let observability_enabled = env("OBSERVABILITY_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);
        let observability_interval = env("OBSERVABILITY_INTERVAL")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);

        Ok(Self {
            mode,
            risk_per_trade: args.risk,
            daily_risk: args.daily_risk,
            log_level: args.loglevel,
            strategy: args.strategy,
            pair,
            timeframe: Timeframe::FifteenMin,
            database_url: args.db,
            poll_interval: Duration::from_secs(args.poll_secs.max(1)),
            run_once: args.once,
            coinbase: CoinbaseConfig {
                api_url: env("COINBASE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
                credentials,
            },
            paper_equity,
            bootstrap_candles: 300,
            observability_enabled,
            observability_interval,
        })
    }
}
