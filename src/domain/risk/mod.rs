// Risk management domain
pub mod daily_drawdown;
pub mod position_sizing;
