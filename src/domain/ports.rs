use crate::domain::market::timeframe::Timeframe;
use crate::domain::trading::types::{Candle, Order};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

#[async_trait]
pub trait MarketDataService: Send + Sync {
    /// Candles opening in `[start, end)`, oldest first.
    async fn get_candles(
        &self,
        pair: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;
}

/// Acknowledgement returned when an order is accepted
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub exchange_id: Option<String>,
    /// Average fill price when already known (paper fills, instantly settled orders)
    pub fill_price: Option<Decimal>,
}

/// Exchange-side view of an order, used to reconcile after a restart
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOrder {
    pub exchange_id: String,
    pub status: String,
    pub done_reason: Option<String>,
    pub filled_size: Decimal,
    pub executed_value: Decimal,
}

impl RemoteOrder {
    pub fn average_price(&self) -> Option<Decimal> {
        if self.filled_size.is_zero() {
            None
        } else {
            Some(self.executed_value / self.filled_size)
        }
    }

    /// Still working on the exchange; its final fill is not known yet
    pub fn is_working(&self) -> bool {
        self.status != "done"
    }

    /// Finished with something filled
    pub fn is_filled(&self) -> bool {
        !self.is_working() && self.filled_size > Decimal::ZERO
    }
}

#[async_trait]
pub trait ExecutionService: Send + Sync {
    async fn execute(&self, order: &Order) -> Result<ExecutionReport>;

    /// Total balance per currency code
    async fn get_balances(&self) -> Result<HashMap<String, Decimal>>;

    /// Looks an order up by client order id. `None` means the exchange never accepted it.
    async fn find_order(&self, client_id: &str) -> Result<Option<RemoteOrder>>;
}
