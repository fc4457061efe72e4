//! Coinbase Exchange market data
//!
//! `GET /products/{pair}/candles` returns at most 300 rows per call, newest
//! first, each row being `[time, low, high, open, close, volume]` with `time`
//! in epoch seconds. Longer windows are paged.

use crate::domain::errors::ExchangeError;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::MarketDataService;
use crate::domain::trading::types::Candle;
use crate::infrastructure::core::circuit_breaker::CircuitBreaker;
use crate::infrastructure::core::http_client_factory::{HttpClientFactory, build_url};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum rows Coinbase returns for a single candles request
pub const MAX_CANDLES_PER_REQUEST: i64 = 300;

pub struct CoinbaseMarketDataService {
    client: ClientWithMiddleware,
    base_url: String,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl CoinbaseMarketDataService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            base_url: base_url.into(),
            circuit_breaker: Arc::new(CircuitBreaker::for_exchange("CoinbaseMarketData")),
        }
    }

    async fn fetch_page(
        &self,
        pair: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let path = format!("/products/{}/candles", pair);
        let url = build_url(
            &self.base_url,
            &path,
            &[
                ("granularity", timeframe.granularity().to_string()),
                ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ],
        )?;

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .with_context(|| format!("Failed to fetch candles for {}", pair))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Rejected {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let rows: Vec<Value> = response
            .json()
            .await
            .context("Failed to parse Coinbase candles response")?;

        parse_candle_rows(pair, &rows)
    }
}

#[async_trait]
impl MarketDataService for CoinbaseMarketDataService {
    async fn get_candles(
        &self,
        pair: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        if start >= end {
            return Ok(Vec::new());
        }

        let page_span = chrono::Duration::seconds(timeframe.to_seconds() * MAX_CANDLES_PER_REQUEST);
        let mut candles = Vec::new();
        let mut page_start = start;

        while page_start < end {
            let page_end = (page_start + page_span).min(end);

            let page = self
                .circuit_breaker
                .call(self.fetch_page(pair, timeframe, page_start, page_end))
                .await
                .map_err(|e| e.into_anyhow())?;

            debug!(
                "CoinbaseMarketData: {} rows for {} [{} .. {})",
                page.len(),
                pair,
                page_start,
                page_end
            );
            candles.extend(page);
            page_start = page_end;
        }

        let candles = normalize(candles, start.timestamp_millis(), end.timestamp_millis());
        info!(
            "CoinbaseMarketData: fetched {} {} candles for {}",
            candles.len(),
            timeframe,
            pair
        );
        Ok(candles)
    }
}

/// Converts raw candle rows into domain candles. Rows that are not six-element
/// numeric arrays are skipped with a warning.
pub fn parse_candle_rows(pair: &str, rows: &[Value]) -> Result<Vec<Candle>> {
    let mut candles = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(fields) = row.as_array().filter(|a| a.len() >= 6) else {
            warn!("CoinbaseMarketData: skipping malformed row {}", row);
            continue;
        };

        let Some(time_s) = fields[0].as_i64() else {
            return Err(ExchangeError::MalformedResponse {
                endpoint: "candles".to_string(),
                reason: format!("non-integer time in {}", row),
            }
            .into());
        };

        let decimal = |idx: usize| -> Result<Decimal> {
            to_decimal(&fields[idx]).ok_or_else(|| {
                ExchangeError::MalformedResponse {
                    endpoint: "candles".to_string(),
                    reason: format!("field {} is not a number in {}", idx, row),
                }
                .into()
            })
        };

        candles.push(Candle {
            pair: pair.to_string(),
            timestamp: time_s * 1000,
            low: decimal(1)?,
            high: decimal(2)?,
            open: decimal(3)?,
            close: decimal(4)?,
            volume: decimal(5)?,
        });
    }

    Ok(candles)
}

/// Sorts ascending, drops duplicates and anything outside `[start_ms, end_ms)`
fn normalize(mut candles: Vec<Candle>, start_ms: i64, end_ms: i64) -> Vec<Candle> {
    candles.retain(|c| c.timestamp >= start_ms && c.timestamp < end_ms);
    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);
    candles
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}
