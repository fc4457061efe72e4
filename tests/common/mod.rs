#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use coinbot::application::system::{Application, Services};
use coinbot::config::{CliArgs, Config};
use coinbot::domain::market::timeframe::Timeframe;
use coinbot::domain::ports::{ExecutionReport, ExecutionService, MarketDataService, RemoteOrder};
use coinbot::domain::trading::types::{Candle, Order};
use coinbot::infrastructure::persistence::Database;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

pub const PERIOD: i64 = 900_000;
/// Aligned on a 15 minute boundary
pub const BASE: i64 = 1_699_999_200_000;

// --- Mocks ---

/// Serves whatever candles the test has pushed so far
#[derive(Default)]
pub struct ScriptedMarket {
    candles: RwLock<Vec<Candle>>,
    pub calls: AtomicUsize,
    /// Requests hang forever, like an exchange that stopped answering
    stall: bool,
}

impl ScriptedMarket {
    pub fn with(candles: Vec<Candle>) -> Arc<Self> {
        Arc::new(Self {
            candles: RwLock::new(candles),
            calls: AtomicUsize::new(0),
            stall: false,
        })
    }

    pub fn stalled() -> Arc<Self> {
        Arc::new(Self {
            stall: true,
            ..Self::default()
        })
    }

    pub async fn push(&self, candle: Candle) {
        self.candles.write().await.push(candle);
    }
}

#[async_trait]
impl MarketDataService for ScriptedMarket {
    async fn get_candles(
        &self,
        pair: &str,
        _timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Candle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            std::future::pending::<()>().await;
        }
        let (start, end) = (start.timestamp_millis(), end.timestamp_millis());
        Ok(self
            .candles
            .read()
            .await
            .iter()
            .filter(|c| c.pair == pair && c.timestamp >= start && c.timestamp < end)
            .cloned()
            .collect())
    }
}

/// Stands in for the Coinbase order endpoint and counts submissions
pub struct SpyExchange {
    pub submitted: AtomicUsize,
    balances: HashMap<String, Decimal>,
    /// Submissions that fail in transport before any succeeds
    failures: usize,
    lookup_fails: bool,
}

impl SpyExchange {
    pub fn funded(usd: Decimal) -> Arc<Self> {
        let mut balances = HashMap::new();
        balances.insert("USD".to_string(), usd);
        balances.insert("BTC".to_string(), Decimal::ZERO);
        Arc::new(Self {
            submitted: AtomicUsize::new(0),
            balances,
            failures: 0,
            lookup_fails: false,
        })
    }

    /// Every submission dies in transport and order lookups fail too
    pub fn unreachable(usd: Decimal) -> Arc<Self> {
        let mut balances = HashMap::new();
        balances.insert("USD".to_string(), usd);
        balances.insert("BTC".to_string(), Decimal::ZERO);
        Arc::new(Self {
            submitted: AtomicUsize::new(0),
            balances,
            failures: usize::MAX,
            lookup_fails: true,
        })
    }

    pub fn submissions(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionService for SpyExchange {
    async fn execute(&self, order: &Order) -> anyhow::Result<ExecutionReport> {
        let n = self.submitted.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            anyhow::bail!("connection reset");
        }
        Ok(ExecutionReport {
            exchange_id: Some(format!("cb-{}-{}", order.side, n)),
            fill_price: None,
        })
    }

    async fn get_balances(&self) -> anyhow::Result<HashMap<String, Decimal>> {
        Ok(self.balances.clone())
    }

    async fn find_order(&self, _client_id: &str) -> anyhow::Result<Option<RemoteOrder>> {
        if self.lookup_fails {
            anyhow::bail!("lookup timed out");
        }
        Ok(None)
    }
}

// --- Fixtures ---

pub fn bar(i: i64, o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> Candle {
    Candle {
        pair: "BTC-USD".to_string(),
        timestamp: BASE + i * PERIOD,
        open: o,
        high: h,
        low: l,
        close: c,
        volume: dec!(3),
    }
}

/// Twenty quiet rising bars followed by a range expansion to a new high
pub fn breakout_series() -> Vec<Candle> {
    let mut candles: Vec<Candle> = (0..20)
        .map(|i| {
            let base = Decimal::from(100 + i);
            bar(i, base, base + dec!(1), base - dec!(1), base)
        })
        .collect();
    candles.push(bar(20, dec!(120), dec!(125), dec!(118), dec!(124)));
    candles
}

/// A moment just after candle `i` closed
pub fn after_close(i: i64) -> i64 {
    BASE + (i + 1) * PERIOD + 5_000
}

pub fn config(argv: &[&str]) -> Config {
    let mut full = vec!["coinbot"];
    full.extend_from_slice(argv);
    let args = CliArgs::try_parse_from(full).unwrap();
    Config::resolve(args, |name| match name {
        "COINBASE_API_KEY" => Some("key".to_string()),
        "COINBASE_API_SECRET" => Some("Y29pbmJvdC10ZXN0LXNlY3JldA==".to_string()),
        "COINBASE_API_PASSPHRASE" => Some("pass".to_string()),
        _ => None,
    })
    .unwrap()
}

pub fn temp_db_url(name: &str) -> String {
    let path = std::env::temp_dir().join(format!("coinbot-{}-{}.db", name, uuid::Uuid::new_v4()));
    format!("sqlite://{}", path.display())
}

pub async fn app(
    config: Config,
    market: Arc<ScriptedMarket>,
    exchange: Option<Arc<SpyExchange>>,
) -> Application {
    let database = Database::new(&config.database_url).await.unwrap();
    let exchange = exchange.map(|e| e as Arc<dyn ExecutionService>);
    Application::with_services(config, database, Services { market, exchange }).unwrap()
}
