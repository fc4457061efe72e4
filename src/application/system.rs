use anyhow::{Context, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::application::strategies::StrategyFactory;
use crate::application::trading::{
    CandleSynchronizer, CycleOutcome, OrderManager, TradingEngine,
};
use crate::config::{Config, ERROR_BACKOFF};
use crate::domain::errors::ConfigError;
use crate::domain::market::market_state::MarketStateLabeler;
use crate::domain::ports::{ExecutionService, MarketDataService};
use crate::domain::repositories::{
    CandleRepository, OrderRepository, RiskStateRepository, TickLogRepository,
};
use crate::domain::risk::daily_drawdown::DailyDrawdownGuard;
use crate::domain::risk::position_sizing::{DEFAULT_MIN_ORDER_SIZE, PositionSizer};
use crate::domain::trading::types::TradingMode;
use crate::infrastructure::coinbase::{
    CoinbaseExecutionService, CoinbaseMarketDataService, RequestSigner,
};
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::paper::PaperExecutionService;
use crate::infrastructure::persistence::{
    Database, SqliteCandleRepository, SqliteOrderRepository, SqliteRiskStateRepository,
    SqliteTickLogRepository,
};

/// Exchange-facing services, swappable for tests
pub struct Services {
    pub market: Arc<dyn MarketDataService>,
    /// Order endpoint; only ever used in live mode
    pub exchange: Option<Arc<dyn ExecutionService>>,
}

pub struct Application {
    pub config: Config,
    pub database: Database,
    pub metrics: Metrics,
    engine: TradingEngine,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self> {
        info!(
            "Building coinbot (Mode: {}, Pair: {}, Strategy: {})...",
            config.mode, config.pair, config.strategy
        );

        info!("Initializing Database at {}", config.database_url);
        let database = Database::new(&config.database_url)
            .await
            .context("Failed to initialize database")?;

        let market: Arc<dyn MarketDataService> =
            Arc::new(CoinbaseMarketDataService::new(config.coinbase.api_url.clone()));

        let exchange: Option<Arc<dyn ExecutionService>> = match config.mode {
            TradingMode::Live => {
                let creds = config
                    .coinbase
                    .credentials
                    .as_ref()
                    .ok_or(ConfigError::MissingCredential {
                        name: crate::config::API_KEY_VAR,
                    })?;
                let signer =
                    RequestSigner::new(&creds.api_key, &creds.api_secret, &creds.passphrase)?;
                info!("Using Coinbase execution ({})", config.coinbase.api_url);
                Some(Arc::new(CoinbaseExecutionService::new(
                    config.coinbase.api_url.clone(),
                    signer,
                )))
            }
            TradingMode::Paper => None,
        };

        Self::with_services(config, database, Services { market, exchange })
    }

    /// Wires the engine around already-built exchange services
    pub fn with_services(config: Config, database: Database, services: Services) -> Result<Self> {
        let metrics = Metrics::new()?;

        let candles: Arc<dyn CandleRepository> =
            Arc::new(SqliteCandleRepository::new(database.pool.clone()));
        let orders: Arc<dyn OrderRepository> =
            Arc::new(SqliteOrderRepository::new(database.pool.clone()));
        let tick_logs: Arc<dyn TickLogRepository> =
            Arc::new(SqliteTickLogRepository::new(database.pool.clone()));
        let risk_states: Arc<dyn RiskStateRepository> =
            Arc::new(SqliteRiskStateRepository::new(database.clone()));

        // Paper mode routes every order to the local simulator, whatever exchange was supplied
        let execution: Arc<dyn ExecutionService> = match config.mode {
            TradingMode::Live => services.exchange.ok_or(ConfigError::MissingCredential {
                name: crate::config::API_KEY_VAR,
            })?,
            TradingMode::Paper => {
                info!(
                    "Using paper execution (starting equity {})",
                    config.paper_equity
                );
                Arc::new(PaperExecutionService::new(
                    orders.clone(),
                    config.pair.clone(),
                    config.paper_equity,
                ))
            }
        };

        let strategy = StrategyFactory::create(config.strategy);
        let labeler = MarketStateLabeler::default();

        let synchronizer = CandleSynchronizer::new(
            services.market,
            candles.clone(),
            config.pair.clone(),
            config.timeframe,
            config.bootstrap_candles,
        );
        let order_manager = OrderManager::new(
            orders,
            execution,
            config.mode,
            config.pair.clone(),
        )
        .with_metrics(metrics.clone());

        let engine = TradingEngine::builder()
            .pair(config.pair.clone())
            .timeframe(config.timeframe)
            .history(config.bootstrap_candles)
            .strategy(strategy)
            .labeler(labeler)
            .sizer(PositionSizer::new(config.risk_per_trade, DEFAULT_MIN_ORDER_SIZE))
            .guard(DailyDrawdownGuard::new(config.daily_risk))
            .synchronizer(synchronizer)
            .order_manager(order_manager)
            .candles(candles)
            .tick_logs(tick_logs)
            .risk_states(risk_states)
            .metrics(metrics.clone())
            .build()?;

        info!(
            "Engine ready: {} on {} {} candles, risk {} per trade, daily limit {}",
            engine.strategy_name(),
            config.pair,
            config.timeframe,
            config.risk_per_trade,
            config.daily_risk
        );

        Ok(Self {
            config,
            database,
            metrics,
            engine,
        })
    }

    pub fn engine(&self) -> &TradingEngine {
        &self.engine
    }

    /// Runs cycles until Ctrl+C, a drawdown halt, or (with `--once`) the first cycle.
    ///
    /// A failed cycle is logged and retried after `ERROR_BACKOFF`.
    /// Runs until Ctrl+C, a drawdown halt or, with `--once`, a single cycle.
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl+C handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Like `run`, stopping as soon as `shutdown` resolves, even mid-cycle.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Trading loop started (poll every {:?}, mode {})",
            self.config.poll_interval, self.config.mode
        );
        tokio::pin!(shutdown);

        loop {
            let now_ms = Utc::now().timestamp_millis();

            let cycle = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown signal received mid-cycle. Exiting...");
                    return Ok(());
                }
                cycle = self.engine.run_cycle(now_ms) => cycle,
            };

            let delay = match cycle {
                Ok(CycleOutcome::Halted { equity, threshold }) => {
                    error!(
                        "Trading halted: equity {} below daily limit {}. Restart after review.",
                        equity, threshold
                    );
                    return Ok(());
                }
                Ok(_) => self.config.poll_interval,
                Err(e) => {
                    error!("Cycle failed: {:#}", e);
                    if self.config.run_once {
                        return Err(e);
                    }
                    warn!("Backing off for {:?}", ERROR_BACKOFF);
                    ERROR_BACKOFF
                }
            };

            if self.config.run_once {
                info!("Single cycle complete (--once).");
                return Ok(());
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received. Exiting...");
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
