use super::candle_sync::CandleSynchronizer;
use super::order_manager::{EntryRequest, OrderManager};
use crate::application::strategies::{AnalysisContext, Signal, TradingStrategy};
use crate::domain::errors::{RiskViolation, StrategyError};
use crate::domain::market::market_state::MarketStateLabeler;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::repositories::{CandleRepository, RiskStateRepository, TickLogRepository};
use crate::domain::risk::daily_drawdown::{DailyDrawdownGuard, RiskState};
use crate::domain::risk::position_sizing::PositionSizer;
use crate::domain::trading::types::{Candle, Decision, OrderSide, OrderStatus, Position, TickLog};
use crate::infrastructure::observability::Metrics;
use anyhow::{Result, anyhow};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of one polling cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The latest closed candle was evaluated and logged
    Evaluated { candle_ts: i64, decision: Decision },
    /// Nothing new to evaluate
    Idle,
    /// Orders from an earlier cycle are still unresolved; nothing was evaluated
    AwaitingSettlement { pending: usize },
    /// Daily drawdown limit breached; trading must stop
    Halted { equity: Decimal, threshold: Decimal },
}

/// One polling cycle: reconcile, sync, guard, evaluate, execute, log.
pub struct TradingEngine {
    pair: String,
    timeframe: Timeframe,
    history: usize,
    strategy: Arc<dyn TradingStrategy>,
    labeler: MarketStateLabeler,
    sizer: PositionSizer,
    guard: DailyDrawdownGuard,
    synchronizer: CandleSynchronizer,
    order_manager: OrderManager,
    candles: Arc<dyn CandleRepository>,
    tick_logs: Arc<dyn TickLogRepository>,
    risk_states: Arc<dyn RiskStateRepository>,
    metrics: Option<Metrics>,
}

impl TradingEngine {
    pub fn builder() -> TradingEngineBuilder {
        TradingEngineBuilder::default()
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub async fn run_cycle(&self, now_ms: i64) -> Result<CycleOutcome> {
        let reconciled = self.order_manager.reconcile_pending().await?;
        if reconciled.resolved > 0 {
            info!(
                "Engine [{}]: reconciled {} pending orders",
                self.pair, reconciled.resolved
            );
        }

        let ingested = self.synchronizer.sync(now_ms).await?;
        if let Some(metrics) = &self.metrics {
            metrics.candles_ingested_total.inc_by(ingested);
        }

        // The position is unknown until every pending order is settled
        if reconciled.unresolved > 0 {
            warn!(
                "Engine [{}]: {} pending orders unresolved, not trading this cycle",
                self.pair, reconciled.unresolved
            );
            return Ok(CycleOutcome::AwaitingSettlement {
                pending: reconciled.unresolved,
            });
        }

        let candles = self
            .candles
            .recent(&self.pair, self.timeframe, self.history)
            .await?;
        let Some(last) = candles.last().cloned() else {
            debug!("Engine [{}]: no candles stored yet", self.pair);
            return Ok(CycleOutcome::Idle);
        };

        let equity = self.order_manager.equity(last.close).await?;
        if let Err(RiskViolation::DailyDrawdown {
            equity,
            threshold,
            baseline,
        }) = self.check_drawdown(equity, now_ms).await?
        {
            error!(
                "Engine [{}]: daily drawdown limit breached (equity {} < {}, baseline {}). Halting.",
                self.pair, equity, threshold, baseline
            );
            return Ok(CycleOutcome::Halted { equity, threshold });
        }

        let already_logged = self
            .tick_logs
            .latest_timestamp(&self.pair)
            .await?
            .is_some_and(|ts| ts >= last.timestamp);
        if already_logged {
            debug!(
                "Engine [{}]: candle {} already evaluated",
                self.pair, last.timestamp
            );
            return Ok(CycleOutcome::Idle);
        }

        let state = self.labeler.label(&candles);
        let position = self.order_manager.position().await?;
        let ctx = AnalysisContext::new(self.pair.clone(), candles, state, position)
            .ok_or_else(|| anyhow!("Empty candle window"))?;

        let signal = self.evaluate(&ctx)?;
        let (decision, realized) = self.act(signal, &ctx, &last, equity).await?;

        let equity_after = self.order_manager.equity(last.close).await?;
        let pnl = match (realized, self.order_manager.position().await?) {
            (Some(pnl), _) => pnl,
            (None, Some(open)) => open.pnl_at(last.close),
            (None, None) => Decimal::ZERO,
        };

        let log = TickLog {
            timestamp: last.timestamp,
            pair: self.pair.clone(),
            state: state.as_str().to_string(),
            decision,
            pnl,
            equity: equity_after,
        };
        self.tick_logs.insert(&log).await?;

        info!(
            "Engine [{}]: candle {} close {} state={} decision={} pnl={} equity={}",
            self.pair, last.timestamp, last.close, state, decision, pnl, equity_after
        );
        self.update_metrics(decision, equity_after).await?;

        Ok(CycleOutcome::Evaluated {
            candle_ts: last.timestamp,
            decision,
        })
    }

    /// Loads (or creates) the persisted baseline, checks it, and saves it back.
    /// The outer `Result` carries storage errors; the inner one the verdict.
    async fn check_drawdown(
        &self,
        equity: Decimal,
        now_ms: i64,
    ) -> Result<Result<(), RiskViolation>> {
        let mut state = self
            .risk_states
            .load(&self.pair)
            .await?
            .unwrap_or_else(|| RiskState::new(self.pair.clone()));

        let verdict = self.guard.check(&mut state, equity, now_ms);
        self.risk_states.save(&state).await?;

        if let Some(metrics) = &self.metrics {
            metrics
                .drawdown_current
                .set(state.drawdown(equity).to_f64().unwrap_or(0.0));
            metrics
                .trading_halted
                .set(if verdict.is_err() { 1.0 } else { 0.0 });
        }
        Ok(verdict)
    }

    fn evaluate(&self, ctx: &AnalysisContext) -> Result<Option<Signal>> {
        if ctx.candles.len() < self.strategy.min_candles() {
            debug!(
                "Engine [{}]: {} candles, {} needs {}",
                self.pair,
                ctx.candles.len(),
                self.strategy.name(),
                self.strategy.min_candles()
            );
            return Ok(None);
        }

        match self.strategy.analyze(ctx) {
            Ok(signal) => Ok(signal),
            Err(StrategyError::InsufficientData { need, have }) => {
                debug!(
                    "Engine [{}]: strategy needs {} candles, have {}",
                    self.pair, need, have
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Turns a signal into an order. Returns the decision and, for exits,
    /// the realised PnL.
    async fn act(
        &self,
        signal: Option<Signal>,
        ctx: &AnalysisContext,
        last: &Candle,
        equity: Decimal,
    ) -> Result<(Decision, Option<Decimal>)> {
        let Some(signal) = signal else {
            return Ok((Decision::Hold, None));
        };

        match (signal.side, &ctx.position) {
            (OrderSide::Buy, None) => self.enter(signal, last, equity).await,
            (OrderSide::Sell, Some(position)) => self.exit(signal, position, last).await,
            (side, _) => {
                warn!(
                    "Engine [{}]: ignoring {} signal ({}) in current position state",
                    self.pair, side, signal.reason
                );
                Ok((Decision::Hold, None))
            }
        }
    }

    async fn enter(
        &self,
        signal: Signal,
        last: &Candle,
        equity: Decimal,
    ) -> Result<(Decision, Option<Decimal>)> {
        let price = signal.price.unwrap_or(last.close);
        let amount = match self.sizer.size(equity, price, signal.stop) {
            Ok(amount) => amount,
            Err(violation) => {
                warn!("Engine [{}]: entry skipped: {}", self.pair, violation);
                return Ok((Decision::Skipped, None));
            }
        };

        info!(
            "Engine [{}]: BUY {} @ {} ({}), risking {} of equity {}",
            self.pair,
            amount,
            price,
            signal.reason,
            self.sizer.risk_per_trade(),
            equity
        );

        let order = self
            .order_manager
            .enter(EntryRequest {
                candle_ts: last.timestamp,
                price,
                amount,
                stop: signal.stop,
                take_profit: signal.take_profit,
            })
            .await?;

        let decision = match order.status {
            OrderStatus::Rejected => Decision::Skipped,
            _ => Decision::Enter,
        };
        Ok((decision, None))
    }

    async fn exit(
        &self,
        signal: Signal,
        position: &Position,
        last: &Candle,
    ) -> Result<(Decision, Option<Decimal>)> {
        let price = signal.price.unwrap_or(last.close);
        info!(
            "Engine [{}]: SELL {} @ {} ({})",
            self.pair, position.amount, price, signal.reason
        );

        let order = self
            .order_manager
            .exit(position, last.timestamp, price)
            .await?;

        match order.status {
            OrderStatus::Rejected => Ok((Decision::Skipped, None)),
            _ => Ok((Decision::Exit, order.pnl)),
        }
    }

    async fn update_metrics(&self, decision: Decision, equity: Decimal) -> Result<()> {
        let Some(metrics) = &self.metrics else {
            return Ok(());
        };
        metrics.inc_decision(decision.as_str());
        metrics.equity.set(equity.to_f64().unwrap_or(0.0));
        let held = self
            .order_manager
            .position()
            .await?
            .map(|p| p.amount)
            .unwrap_or(Decimal::ZERO);
        metrics.position_size.set(held.to_f64().unwrap_or(0.0));
        Ok(())
    }
}

#[derive(Default)]
pub struct TradingEngineBuilder {
    pair: Option<String>,
    timeframe: Timeframe,
    history: Option<usize>,
    strategy: Option<Arc<dyn TradingStrategy>>,
    labeler: Option<MarketStateLabeler>,
    sizer: Option<PositionSizer>,
    guard: Option<DailyDrawdownGuard>,
    synchronizer: Option<CandleSynchronizer>,
    order_manager: Option<OrderManager>,
    candles: Option<Arc<dyn CandleRepository>>,
    tick_logs: Option<Arc<dyn TickLogRepository>>,
    risk_states: Option<Arc<dyn RiskStateRepository>>,
    metrics: Option<Metrics>,
}

impl TradingEngineBuilder {
    pub fn pair(mut self, pair: impl Into<String>) -> Self {
        self.pair = Some(pair.into());
        self
    }

    pub fn timeframe(mut self, timeframe: Timeframe) -> Self {
        self.timeframe = timeframe;
        self
    }

    /// Candles loaded from the database for each evaluation
    pub fn history(mut self, history: usize) -> Self {
        self.history = Some(history);
        self
    }

    pub fn strategy(mut self, strategy: Arc<dyn TradingStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn labeler(mut self, labeler: MarketStateLabeler) -> Self {
        self.labeler = Some(labeler);
        self
    }

    pub fn sizer(mut self, sizer: PositionSizer) -> Self {
        self.sizer = Some(sizer);
        self
    }

    pub fn guard(mut self, guard: DailyDrawdownGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn synchronizer(mut self, synchronizer: CandleSynchronizer) -> Self {
        self.synchronizer = Some(synchronizer);
        self
    }

    pub fn order_manager(mut self, order_manager: OrderManager) -> Self {
        self.order_manager = Some(order_manager);
        self
    }

    pub fn candles(mut self, repo: Arc<dyn CandleRepository>) -> Self {
        self.candles = Some(repo);
        self
    }

    pub fn tick_logs(mut self, repo: Arc<dyn TickLogRepository>) -> Self {
        self.tick_logs = Some(repo);
        self
    }

    pub fn risk_states(mut self, repo: Arc<dyn RiskStateRepository>) -> Self {
        self.risk_states = Some(repo);
        self
    }

    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<TradingEngine> {
        let strategy = self.strategy.ok_or_else(|| anyhow!("strategy is required"))?;
        let labeler = self.labeler.unwrap_or_default();
        let history = self
            .history
            .unwrap_or(200)
            .max(strategy.min_candles())
            .max(labeler.lookback() + 1);

        Ok(TradingEngine {
            pair: self.pair.ok_or_else(|| anyhow!("pair is required"))?,
            timeframe: self.timeframe,
            history,
            strategy,
            labeler,
            sizer: self.sizer.unwrap_or_default(),
            guard: self.guard.ok_or_else(|| anyhow!("drawdown guard is required"))?,
            synchronizer: self
                .synchronizer
                .ok_or_else(|| anyhow!("candle synchronizer is required"))?,
            order_manager: self
                .order_manager
                .ok_or_else(|| anyhow!("order manager is required"))?,
            candles: self
                .candles
                .ok_or_else(|| anyhow!("candle repository is required"))?,
            tick_logs: self
                .tick_logs
                .ok_or_else(|| anyhow!("tick log repository is required"))?,
            risk_states: self
                .risk_states
                .ok_or_else(|| anyhow!("risk state repository is required"))?,
            metrics: self.metrics,
        })
    }
}
