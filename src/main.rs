//! coinbot - headless 15-minute candle trading bot for Coinbase
//!
//! # Usage
//! ```sh
//! coinbot --paper --risk 0.02 --loglevel debug
//! ```
//!
//! # Environment Variables
//! - `COINBASE_API_KEY`, `COINBASE_API_SECRET`, `COINBASE_API_PASSPHRASE` - required with `--live`
//! - `COINBASE_API_URL` - REST endpoint (default: production exchange)
//! - `COINBOT_PAPER_EQUITY` - starting paper balance (default: 10000)
//! - `OBSERVABILITY_ENABLED` / `OBSERVABILITY_INTERVAL` - JSON metrics output
//! - `RUST_LOG` - overrides `--loglevel` when set

use anyhow::Result;
use clap::Parser;
use coinbot::application::system::Application;
use coinbot::config::{CliArgs, Config};
use coinbot::infrastructure::observability::MetricsReporter;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.loglevel.as_directive()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("coinbot {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_args(args)?;
    info!(
        "Configuration loaded: Mode={}, Pair={}, Risk={}, DailyRisk={}, Strategy={}",
        config.mode, config.pair, config.risk_per_trade, config.daily_risk, config.strategy
    );

    let app = Application::build(config.clone()).await?;

    if config.observability_enabled && !config.run_once {
        let reporter = MetricsReporter::new(
            app.metrics.clone(),
            config.mode.as_str(),
            config.pair.clone(),
            config.observability_interval,
        );
        tokio::spawn(async move {
            reporter.run().await;
        });
        info!(
            "Metrics reporter started (interval: {}s)",
            config.observability_interval
        );
    }

    app.run().await?;

    info!("coinbot stopped.");
    Ok(())
}
