use crate::domain::market::timeframe::Timeframe;
use crate::domain::repositories::{
    CandleRepository, OrderRepository, RiskStateRepository, TickLogRepository,
};
use crate::domain::risk::daily_drawdown::RiskState;
use crate::domain::trading::types::{
    Candle, Order, OrderStatus, TickLog, TradingMode,
};
use crate::infrastructure::persistence::database::Database;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

fn parse_decimal(raw: &str, column: &str) -> Result<Decimal> {
    Decimal::from_str(raw).with_context(|| format!("Invalid decimal in column {}: {}", column, raw))
}

fn parse_optional_decimal(raw: Option<String>, column: &str) -> Result<Option<Decimal>> {
    raw.map(|s| parse_decimal(&s, column)).transpose()
}

pub struct SqliteCandleRepository {
    pool: SqlitePool,
}

impl SqliteCandleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandleRepository for SqliteCandleRepository {
    async fn save_all(&self, timeframe: Timeframe, candles: &[Candle]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for candle in candles {
            // Stored candles are immutable: a re-fetched bar never overwrites the first copy
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO candles (ts, pair, timeframe, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(candle.timestamp)
            .bind(&candle.pair)
            .bind(timeframe.label())
            .bind(candle.open.to_string())
            .bind(candle.high.to_string())
            .bind(candle.low.to_string())
            .bind(candle.close.to_string())
            .bind(candle.volume.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to save candle")?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        debug!(
            "Stored {} new of {} fetched candles",
            inserted,
            candles.len()
        );
        Ok(inserted)
    }

    async fn latest_timestamp(&self, pair: &str, timeframe: Timeframe) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT MAX(ts) AS ts FROM candles WHERE pair = ? AND timeframe = ?")
            .bind(pair)
            .bind(timeframe.label())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<Option<i64>, _>("ts")?)
    }

    async fn recent(&self, pair: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            "SELECT * FROM candles WHERE pair = ? AND timeframe = ? ORDER BY ts DESC LIMIT ?",
        )
        .bind(pair)
        .bind(timeframe.label())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows.into_iter().rev() {
            candles.push(Candle {
                pair: row.try_get("pair")?,
                timestamp: row.try_get("ts")?,
                open: parse_decimal(row.try_get("open")?, "open")?,
                high: parse_decimal(row.try_get("high")?, "high")?,
                low: parse_decimal(row.try_get("low")?, "low")?,
                close: parse_decimal(row.try_get("close")?, "close")?,
                volume: parse_decimal(row.try_get("volume")?, "volume")?,
            });
        }
        Ok(candles)
    }

    async fn count(&self, pair: &str, timeframe: Timeframe) -> Result<usize> {
        let row = sqlx::query(
            "SELECT COUNT(*) as count FROM candles WHERE pair = ? AND timeframe = ?",
        )
        .bind(pair)
        .bind(timeframe.label())
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as usize)
    }
}

pub struct SqliteOrderRepository {
    pool: SqlitePool,
}

impl SqliteOrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_rows_to_orders(&self, rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<Order>> {
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let side: String = row.try_get("side")?;
            let status: String = row.try_get("status")?;
            let mode: String = row.try_get("mode")?;

            orders.push(Order {
                id: row.try_get("id")?,
                exchange_id: row.try_get("exchange_id")?,
                pair: row.try_get("pair")?,
                side: side.parse()?,
                price: parse_decimal(row.try_get("price")?, "price")?,
                amount: parse_decimal(row.try_get("amount")?, "amount")?,
                stop: parse_optional_decimal(row.try_get("stop")?, "stop")?,
                take_profit: parse_optional_decimal(row.try_get("take_profit")?, "take_profit")?,
                status: status.parse()?,
                mode: mode.parse()?,
                pnl: parse_optional_decimal(row.try_get("pnl")?, "pnl")?,
                timestamp: row.try_get("ts")?,
            });
        }
        Ok(orders)
    }
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn insert(&self, order: &Order) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, exchange_id, ts, pair, side, price, amount, stop, take_profit, status, mode, pnl)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&order.id)
        .bind(&order.exchange_id)
        .bind(order.timestamp)
        .bind(&order.pair)
        .bind(order.side.as_str())
        .bind(order.price.to_string())
        .bind(order.amount.to_string())
        .bind(order.stop.map(|d| d.to_string()))
        .bind(order.take_profit.map(|d| d.to_string()))
        .bind(order.status.as_str())
        .bind(order.mode.as_str())
        .bind(order.pnl.map(|d| d.to_string()))
        .execute(&self.pool)
        .await
        .context("Failed to save order")?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            info!("Persisted Order {} ({} {})", order.id, order.side, order.status);
        }
        Ok(inserted)
    }

    async fn update_status(
        &self,
        id: &str,
        status: OrderStatus,
        exchange_id: Option<&str>,
        price: Option<Decimal>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders SET
                status = ?,
                exchange_id = COALESCE(?, exchange_id),
                price = COALESCE(?, price),
                updated_at = strftime('%s', 'now')
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(exchange_id)
        .bind(price.map(|d| d.to_string()))
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update order status")?;
        Ok(())
    }

    async fn set_pnl(&self, id: &str, pnl: Decimal) -> Result<()> {
        sqlx::query("UPDATE orders SET pnl = ? WHERE id = ?")
            .bind(pnl.to_string())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to record order pnl")?;
        Ok(())
    }

    async fn set_amount(&self, id: &str, amount: Decimal) -> Result<()> {
        sqlx::query("UPDATE orders SET amount = ? WHERE id = ?")
            .bind(amount.to_string())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to record filled size")?;
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<Order>> {
        let rows = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(self.map_rows_to_orders(rows)?.into_iter().next())
    }

    async fn last_open(&self, pair: &str) -> Result<Option<Order>> {
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE pair = ? AND side = 'buy' AND status = 'open' ORDER BY ts DESC LIMIT 1",
        )
        .bind(pair)
        .fetch_all(&self.pool)
        .await?;
        Ok(self.map_rows_to_orders(rows)?.into_iter().next())
    }

    async fn pending(&self, pair: &str) -> Result<Vec<Order>> {
        let rows =
            sqlx::query("SELECT * FROM orders WHERE pair = ? AND status = 'pending' ORDER BY ts ASC")
                .bind(pair)
                .fetch_all(&self.pool)
                .await?;
        self.map_rows_to_orders(rows)
    }

    async fn find_recent(&self, pair: &str, limit: usize) -> Result<Vec<Order>> {
        let rows = sqlx::query("SELECT * FROM orders WHERE pair = ? ORDER BY ts DESC LIMIT ?")
            .bind(pair)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        self.map_rows_to_orders(rows)
    }

    async fn realized_pnl(&self, pair: &str, mode: TradingMode) -> Result<Decimal> {
        // Summed in Rust: SQLite would go through REAL and lose precision
        let rows = sqlx::query(
            "SELECT pnl FROM orders WHERE pair = ? AND mode = ? AND side = 'sell' AND status = 'filled' AND pnl IS NOT NULL",
        )
        .bind(pair)
        .bind(mode.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut total = Decimal::ZERO;
        for row in rows {
            total += parse_decimal(row.try_get("pnl")?, "pnl")?;
        }
        Ok(total)
    }

    async fn count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM orders")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as usize)
    }
}

pub struct SqliteTickLogRepository {
    pool: SqlitePool,
}

impl SqliteTickLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TickLogRepository for SqliteTickLogRepository {
    async fn insert(&self, log: &TickLog) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO tick_logs (ts, pair, state, decision, pnl, equity)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.timestamp)
        .bind(&log.pair)
        .bind(&log.state)
        .bind(log.decision.as_str())
        .bind(log.pnl.to_string())
        .bind(log.equity.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to save tick log")?;
        Ok(result.rows_affected() > 0)
    }

    async fn latest_timestamp(&self, pair: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT MAX(ts) AS ts FROM tick_logs WHERE pair = ?")
            .bind(pair)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<Option<i64>, _>("ts")?)
    }

    async fn find_recent(&self, pair: &str, limit: usize) -> Result<Vec<TickLog>> {
        let rows = sqlx::query("SELECT * FROM tick_logs WHERE pair = ? ORDER BY ts DESC LIMIT ?")
            .bind(pair)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut logs = Vec::with_capacity(rows.len());
        for row in rows {
            let decision: String = row.try_get("decision")?;
            logs.push(TickLog {
                timestamp: row.try_get("ts")?,
                pair: row.try_get("pair")?,
                state: row.try_get("state")?,
                decision: decision.parse()?,
                pnl: parse_decimal(row.try_get("pnl")?, "pnl")?,
                equity: parse_decimal(row.try_get("equity")?, "equity")?,
            });
        }
        Ok(logs)
    }
}

pub struct SqliteRiskStateRepository {
    database: Database,
}

impl SqliteRiskStateRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl RiskStateRepository for SqliteRiskStateRepository {
    /// Save the risk state to the database (upsert)
    async fn save(&self, state: &RiskState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO risk_state (id, baseline_equity, baseline_at, equity_high_water_mark, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT(id) DO UPDATE SET
                baseline_equity = excluded.baseline_equity,
                baseline_at = excluded.baseline_at,
                equity_high_water_mark = excluded.equity_high_water_mark,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.id)
        .bind(state.baseline_equity.to_string())
        .bind(state.baseline_at)
        .bind(state.equity_high_water_mark.to_string())
        .bind(state.updated_at)
        .execute(&self.database.pool)
        .await
        .context("Failed to save risk state")?;

        Ok(())
    }

    /// Load the risk state from the database
    async fn load(&self, id: &str) -> Result<Option<RiskState>> {
        let row = sqlx::query_as::<_, (String, String, i64, String, i64)>(
            r#"
            SELECT id, baseline_equity, baseline_at, equity_high_water_mark, updated_at
            FROM risk_state
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.database.pool)
        .await
        .context("Failed to load risk state")?;

        row.map(|(id, baseline, baseline_at, hwm, updated_at)| {
            Ok(RiskState {
                id,
                baseline_equity: parse_decimal(&baseline, "baseline_equity")?,
                baseline_at,
                equity_high_water_mark: parse_decimal(&hwm, "equity_high_water_mark")?,
                updated_at,
            })
        })
        .transpose()
    }
}
