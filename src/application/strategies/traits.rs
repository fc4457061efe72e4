use crate::domain::errors::StrategyError;
use crate::domain::market::market_state::MarketState;
use crate::domain::trading::types::{Candle, OrderSide, Position};
use rust_decimal::Decimal;

/// Everything a strategy sees when the latest closed candle is evaluated
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub pair: String,
    /// Oldest first; the last element is the candle being evaluated
    pub candles: Vec<Candle>,
    pub state: MarketState,
    pub position: Option<Position>,
    pub current_price: Decimal,
    pub timestamp: i64,
}

impl AnalysisContext {
    pub fn new(
        pair: impl Into<String>,
        candles: Vec<Candle>,
        state: MarketState,
        position: Option<Position>,
    ) -> Option<Self> {
        let last = candles.last()?;
        let current_price = last.close;
        let timestamp = last.timestamp;
        Some(Self {
            pair: pair.into(),
            candles,
            state,
            position,
            current_price,
            timestamp,
        })
    }

    pub fn last_candle(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub side: OrderSide,
    pub reason: String,
    /// Reference fill price; market orders use the last close unless a stop was hit
    pub price: Option<Decimal>,
    pub stop: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

impl Signal {
    pub fn buy(reason: impl Into<String>) -> Self {
        Self {
            side: OrderSide::Buy,
            reason: reason.into(),
            price: None,
            stop: None,
            take_profit: None,
        }
    }

    pub fn sell(reason: impl Into<String>) -> Self {
        Self {
            side: OrderSide::Sell,
            reason: reason.into(),
            price: None,
            stop: None,
            take_profit: None,
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_stop(mut self, stop: Decimal) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn with_take_profit(mut self, take_profit: Decimal) -> Self {
        self.take_profit = Some(take_profit);
        self
    }
}

pub trait TradingStrategy: Send + Sync {
    /// Returns a buy signal only when flat and a sell signal only when holding.
    fn analyze(&self, ctx: &AnalysisContext) -> Result<Option<Signal>, StrategyError>;

    fn name(&self) -> &str;

    /// Candles needed before `analyze` can say anything
    fn min_candles(&self) -> usize;
}
