mod breakout;
mod ema_crossover;
mod traits;

pub use breakout::BreakoutStrategy;
pub use ema_crossover::EmaCrossoverStrategy;
pub use traits::{AnalysisContext, Signal, TradingStrategy};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StrategyMode {
    #[default]
    EmaCross,
    Breakout,
}

impl std::str::FromStr for StrategyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "ema-cross" | "emacross" | "ema" => Ok(StrategyMode::EmaCross),
            "breakout" => Ok(StrategyMode::Breakout),
            _ => anyhow::bail!("Invalid strategy: {}. Valid: ema-cross, breakout", s),
        }
    }
}

impl std::fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyMode::EmaCross => write!(f, "ema-cross"),
            StrategyMode::Breakout => write!(f, "breakout"),
        }
    }
}

pub struct StrategyFactory;

impl StrategyFactory {
    pub fn create(mode: StrategyMode) -> Arc<dyn TradingStrategy> {
        match mode {
            StrategyMode::EmaCross => Arc::new(EmaCrossoverStrategy::default()),
            StrategyMode::Breakout => Arc::new(BreakoutStrategy::default()),
        }
    }
}
