use crate::application::strategies::StrategyMode;
use clap::{ArgGroup, Parser, ValueEnum};
use rust_decimal::Decimal;

/// Command line of the `coinbot` binary
#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "15-minute candle trading bot for Coinbase", long_about = None)]
#[command(group(ArgGroup::new("trading_mode").args(["live", "paper"])))]
pub struct CliArgs {
    /// Submit real orders to Coinbase (default)
    #[arg(long)]
    pub live: bool,

    /// Evaluate signals and fill locally; never submits an order
    #[arg(long)]
    pub paper: bool,

    /// Fraction of equity risked per trade
    #[arg(long, default_value = "0.01")]
    pub risk: Decimal,

    /// Log verbosity
    #[arg(long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Halt when equity drops this fraction below the 24h baseline
    #[arg(long = "daily-risk", default_value = "0.1")]
    pub daily_risk: Decimal,

    /// Entry/exit rules
    #[arg(long, default_value = "ema-cross")]
    pub strategy: StrategyMode,

    /// Coinbase product id
    #[arg(long, default_value = "BTC-USD")]
    pub pair: String,

    /// SQLite database URL
    #[arg(long, default_value = "sqlite://bot_log.db")]
    pub db: String,

    /// Seconds between polling cycles
    #[arg(long = "poll-secs", default_value_t = 60)]
    pub poll_secs: u64,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[value(alias = "warning")]
    Warn,
    #[value(alias = "critical")]
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
