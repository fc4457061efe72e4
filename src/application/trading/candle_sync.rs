use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::MarketDataService;
use crate::domain::repositories::CandleRepository;
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Keeps the candle table caught up with the exchange.
///
/// Resumes right after the newest stored candle; on an empty database it
/// backfills `bootstrap_periods` candles. Only closed candles are stored, so a
/// stored candle never changes.
pub struct CandleSynchronizer {
    market: Arc<dyn MarketDataService>,
    candles: Arc<dyn CandleRepository>,
    pair: String,
    timeframe: Timeframe,
    bootstrap_periods: i64,
}

impl CandleSynchronizer {
    pub fn new(
        market: Arc<dyn MarketDataService>,
        candles: Arc<dyn CandleRepository>,
        pair: impl Into<String>,
        timeframe: Timeframe,
        bootstrap_periods: usize,
    ) -> Self {
        Self {
            market,
            candles,
            pair: pair.into(),
            timeframe,
            bootstrap_periods: bootstrap_periods.max(1) as i64,
        }
    }

    /// Open time of the first candle the next sync would request
    pub async fn resume_from(&self, now_ms: i64) -> Result<i64> {
        let latest = self
            .candles
            .latest_timestamp(&self.pair, self.timeframe)
            .await?;

        Ok(match latest {
            Some(ts) => ts + self.timeframe.to_millis(),
            None => {
                self.timeframe.period_start(now_ms)
                    - self.bootstrap_periods * self.timeframe.to_millis()
            }
        })
    }

    /// Fetches and stores every closed candle missing since the last run.
    /// Returns the number of newly stored candles.
    pub async fn sync(&self, now_ms: i64) -> Result<u64> {
        let start_ms = self.resume_from(now_ms).await?;
        // The bucket containing `now` is still forming
        let end_ms = self.timeframe.period_start(now_ms);

        if start_ms >= end_ms {
            debug!("CandleSync [{}]: up to date", self.pair);
            return Ok(0);
        }

        let fetched = self
            .market
            .get_candles(&self.pair, self.timeframe, to_datetime(start_ms)?, to_datetime(end_ms)?)
            .await?;

        let closed: Vec<_> = fetched
            .into_iter()
            .filter(|c| c.pair == self.pair && self.timeframe.is_closed(c.timestamp, now_ms))
            .collect();

        let inserted = self.candles.save_all(self.timeframe, &closed).await?;
        if inserted > 0 {
            info!(
                "CandleSync [{}]: stored {} new {} candles",
                self.pair, inserted, self.timeframe
            );
        }
        Ok(inserted)
    }
}

fn to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("Timestamp out of range: {}", ms))
}
