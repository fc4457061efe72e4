//! Prometheus metrics definitions for coinbot
//!
//! All metrics use the `coinbot_` prefix and are read-only.

use prometheus::{
    CounterVec, Gauge, IntCounter, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Closed candles written to the database
    pub candles_ingested_total: IntCounter,
    /// Orders by side, final status and mode
    pub orders_total: CounterVec,
    /// Evaluated candles by decision
    pub decisions_total: CounterVec,
    /// Account equity in quote currency
    pub equity: GenericGauge<AtomicF64>,
    /// Drawdown from the daily baseline (0-1)
    pub drawdown_current: GenericGauge<AtomicF64>,
    /// Size of the open position in base currency
    pub position_size: GenericGauge<AtomicF64>,
    /// 1 while the daily drawdown guard is halting trading
    pub trading_halted: GenericGauge<AtomicF64>,
    pub uptime_seconds: GenericGauge<AtomicF64>,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let candles_ingested_total = IntCounter::with_opts(Opts::new(
            "coinbot_candles_ingested_total",
            "Closed candles written to the database",
        ))?;
        registry.register(Box::new(candles_ingested_total.clone()))?;

        let orders_total = CounterVec::new(
            Opts::new("coinbot_orders_total", "Orders by side, status and mode"),
            &["side", "status", "mode"],
        )?;
        registry.register(Box::new(orders_total.clone()))?;

        let decisions_total = CounterVec::new(
            Opts::new("coinbot_decisions_total", "Evaluated candles by decision"),
            &["decision"],
        )?;
        registry.register(Box::new(decisions_total.clone()))?;

        let equity = Gauge::with_opts(Opts::new(
            "coinbot_equity",
            "Account equity in quote currency",
        ))?;
        registry.register(Box::new(equity.clone()))?;

        let drawdown_current = Gauge::with_opts(Opts::new(
            "coinbot_drawdown_current",
            "Drawdown from the daily baseline (0-1)",
        ))?;
        registry.register(Box::new(drawdown_current.clone()))?;

        let position_size = Gauge::with_opts(Opts::new(
            "coinbot_position_size",
            "Open position size in base currency",
        ))?;
        registry.register(Box::new(position_size.clone()))?;

        let trading_halted = Gauge::with_opts(Opts::new(
            "coinbot_trading_halted",
            "Daily drawdown guard status (0=trading, 1=halted)",
        ))?;
        registry.register(Box::new(trading_halted.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "coinbot_uptime_seconds",
            "Process uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            candles_ingested_total,
            orders_total,
            decisions_total,
            equity,
            drawdown_current,
            position_size,
            trading_halted,
            uptime_seconds,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_orders(&self, side: &str, status: &str, mode: &str) {
        self.orders_total
            .with_label_values(&[side, status, mode])
            .inc();
    }

    pub fn inc_decision(&self, decision: &str) {
        self.decisions_total.with_label_values(&[decision]).inc();
    }
}
