pub mod auth;
pub mod execution;
pub mod market_data;

pub use auth::RequestSigner;
pub use execution::CoinbaseExecutionService;
pub use market_data::CoinbaseMarketDataService;
