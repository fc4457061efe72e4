use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Lowercase wire/storage form, as Coinbase expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderSide {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            _ => anyhow::bail!("Invalid order side: {}", s),
        }
    }
}

/// Persisted order lifecycle.
///
/// A buy stays `Open` while the position is held and becomes `Closed` once the
/// matching sell is `Filled`. `Pending` only exists between persisting a live
/// order and hearing back from the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Open,
    Filled,
    Closed,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Open => "open",
            OrderStatus::Filled => "filled",
            OrderStatus::Closed => "closed",
            OrderStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "open" => Ok(OrderStatus::Open),
            "filled" => Ok(OrderStatus::Filled),
            "closed" => Ok(OrderStatus::Closed),
            "rejected" => Ok(OrderStatus::Rejected),
            _ => anyhow::bail!("Invalid order status: {}", s),
        }
    }
}

/// Whether orders go to the exchange or are filled locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    Live,
    Paper,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Live => "live",
            TradingMode::Paper => "paper",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, TradingMode::Live)
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TradingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(TradingMode::Live),
            "paper" => Ok(TradingMode::Paper),
            _ => anyhow::bail!("Invalid trading mode: {}", s),
        }
    }
}

/// OHLCV bar. `timestamp` is the bucket open time in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub pair: String,
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    pub exchange_id: Option<String>,
    pub pair: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub amount: Decimal,
    pub stop: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub status: OrderStatus,
    pub mode: TradingMode,
    pub pnl: Option<Decimal>,
    pub timestamp: i64,
}

impl Order {
    /// Client order id derived from the candle that produced the order.
    ///
    /// Evaluating the same candle twice (e.g. after a crash) must yield the
    /// same id so the order can't be submitted twice.
    pub fn client_id(pair: &str, timestamp: i64, side: OrderSide) -> String {
        let name = format!("{}|{}|{}", pair, timestamp, side);
        uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    pub fn is_open_position(&self) -> bool {
        self.side == OrderSide::Buy && self.status == OrderStatus::Open
    }
}

/// What a cycle decided to do with the latest closed candle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Enter,
    Exit,
    Hold,
    /// A signal fired but sizing or risk rules prevented the order
    Skipped,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Enter => "enter",
            Decision::Exit => "exit",
            Decision::Hold => "hold",
            Decision::Skipped => "skipped",
        }
    }
}

impl FromStr for Decision {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enter" => Ok(Decision::Enter),
            "exit" => Ok(Decision::Exit),
            "hold" => Ok(Decision::Hold),
            "skipped" => Ok(Decision::Skipped),
            _ => anyhow::bail!("Invalid decision: {}", s),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row per evaluated candle
#[derive(Debug, Clone, PartialEq)]
pub struct TickLog {
    pub timestamp: i64,
    pub pair: String,
    pub state: String,
    pub decision: Decision,
    pub pnl: Decimal,
    pub equity: Decimal,
}

/// Open long position reconstructed from the entry order
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub order_id: String,
    pub entry_price: Decimal,
    pub amount: Decimal,
    pub stop: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub opened_at: i64,
}

impl Position {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            entry_price: order.price,
            amount: order.amount,
            stop: order.stop,
            take_profit: order.take_profit,
            opened_at: order.timestamp,
        }
    }

    pub fn pnl_at(&self, exit_price: Decimal) -> Decimal {
        (exit_price - self.entry_price) * self.amount
    }
}

/// Splits a Coinbase product id ("BTC-USD") into base and quote currencies.
pub fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let (base, quote) = pair.split_once('-')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base, quote))
}
