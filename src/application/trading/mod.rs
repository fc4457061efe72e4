pub mod candle_sync;
pub mod engine;
pub mod order_manager;

pub use candle_sync::CandleSynchronizer;
pub use engine::{CycleOutcome, TradingEngine, TradingEngineBuilder};
pub use order_manager::{EntryRequest, OrderManager, Reconciliation};
