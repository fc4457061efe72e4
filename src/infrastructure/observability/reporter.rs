//! Push-based metrics reporter
//!
//! Periodically prints a JSON snapshot of the metrics to stdout, prefixed with
//! `METRICS_JSON:` so log shippers can pick the lines out.

use crate::infrastructure::observability::metrics::Metrics;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub mode: String,
    pub pair: String,
    pub equity: f64,
    pub drawdown: f64,
    pub position_size: f64,
    pub halted: bool,
    pub candles_ingested: u64,
}

pub struct MetricsReporter {
    metrics: Metrics,
    mode: String,
    pair: String,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(
        metrics: Metrics,
        mode: impl Into<String>,
        pair: impl Into<String>,
        interval_seconds: u64,
    ) -> Self {
        Self {
            metrics,
            mode: mode.into(),
            pair: pair.into(),
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    pub async fn run(self) {
        info!(
            "MetricsReporter: Starting push-based metrics (interval: {:?})",
            self.interval
        );

        loop {
            tokio::time::sleep(self.interval).await;

            let snapshot = self.collect_snapshot();
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    println!("METRICS_JSON:{}", json);
                    info!(
                        "Equity: {:.2} | Drawdown: {:.2}% | Position: {} | Uptime: {}s",
                        snapshot.equity,
                        snapshot.drawdown * 100.0,
                        snapshot.position_size,
                        snapshot.uptime_seconds
                    );
                }
                Err(e) => warn!("Failed to serialize metrics: {}", e),
            }
        }
    }

    fn collect_snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        self.metrics.uptime_seconds.set(uptime as f64);

        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: self.mode.clone(),
            pair: self.pair.clone(),
            equity: self.metrics.equity.get(),
            drawdown: self.metrics.drawdown_current.get(),
            position_size: self.metrics.position_size.get(),
            halted: self.metrics.trading_halted.get() > 0.0,
            candles_ingested: self.metrics.candles_ingested_total.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads_gauges() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.equity.set(9800.0);
        metrics.trading_halted.set(1.0);
        metrics.candles_ingested_total.inc_by(3);

        let reporter = MetricsReporter::new(metrics, "paper", "BTC-USD", 60);
        let snapshot = reporter.collect_snapshot();

        assert_eq!(snapshot.equity, 9800.0);
        assert!(snapshot.halted);
        assert_eq!(snapshot.candles_ingested, 3);
        assert_eq!(snapshot.mode, "paper");

        let json = serde_json::to_string(&snapshot).expect("Failed to serialize");
        assert!(json.contains("\"pair\":\"BTC-USD\""));
    }
}
