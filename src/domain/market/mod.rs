// Market analysis domain
pub mod market_state;
pub mod timeframe;
