//! Repository Pattern Abstractions
//!
//! Everything the bot must remember across restarts goes through these traits:
//! - `CandleRepository`: market data, deduplicated on (pair, timeframe, ts)
//! - `OrderRepository`: order lifecycle and the currently open position
//! - `TickLogRepository`: one row per evaluated candle
//! - `RiskStateRepository`: daily drawdown baseline
//!
//! The SQLite implementations live in `infrastructure::persistence`.

use crate::domain::market::timeframe::Timeframe;
use crate::domain::risk::daily_drawdown::RiskState;
use crate::domain::trading::types::{Candle, Order, OrderStatus, TickLog, TradingMode};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

#[async_trait]
pub trait CandleRepository: Send + Sync {
    /// Inserts candles, ignoring ones already stored. Returns how many were new.
    async fn save_all(&self, timeframe: Timeframe, candles: &[Candle]) -> Result<u64>;

    /// Open time of the newest stored candle
    async fn latest_timestamp(&self, pair: &str, timeframe: Timeframe) -> Result<Option<i64>>;

    /// The `limit` most recent candles, oldest first
    async fn recent(&self, pair: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>>;

    async fn count(&self, pair: &str, timeframe: Timeframe) -> Result<usize>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts an order. Returns false if an order with the same id already exists.
    async fn insert(&self, order: &Order) -> Result<bool>;

    async fn update_status(
        &self,
        id: &str,
        status: OrderStatus,
        exchange_id: Option<&str>,
        price: Option<Decimal>,
    ) -> Result<()>;

    async fn set_pnl(&self, id: &str, pnl: Decimal) -> Result<()>;

    /// Replaces the requested size with what the exchange actually filled
    async fn set_amount(&self, id: &str, amount: Decimal) -> Result<()>;

    async fn find(&self, id: &str) -> Result<Option<Order>>;

    /// The buy order backing the currently held position, if any
    async fn last_open(&self, pair: &str) -> Result<Option<Order>>;

    async fn pending(&self, pair: &str) -> Result<Vec<Order>>;

    async fn find_recent(&self, pair: &str, limit: usize) -> Result<Vec<Order>>;

    /// Sum of realised PnL over filled exits
    async fn realized_pnl(&self, pair: &str, mode: TradingMode) -> Result<Decimal>;

    async fn count(&self) -> Result<usize>;
}

#[async_trait]
pub trait TickLogRepository: Send + Sync {
    /// Returns false when the candle already has a tick log
    async fn insert(&self, log: &TickLog) -> Result<bool>;

    async fn latest_timestamp(&self, pair: &str) -> Result<Option<i64>>;

    async fn find_recent(&self, pair: &str, limit: usize) -> Result<Vec<TickLog>>;
}

#[async_trait]
pub trait RiskStateRepository: Send + Sync {
    async fn save(&self, state: &RiskState) -> Result<()>;

    async fn load(&self, id: &str) -> Result<Option<RiskState>>;
}
