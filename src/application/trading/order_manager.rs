use crate::domain::errors::ExchangeError;
use crate::domain::ports::{ExecutionService, RemoteOrder};
use crate::domain::repositories::OrderRepository;
use crate::domain::trading::types::{
    Order, OrderSide, OrderStatus, Position, TradingMode, split_pair,
};
use crate::infrastructure::observability::Metrics;
use anyhow::{Result, anyhow};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of resolving pending orders against the exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub resolved: usize,
    /// Still pending: working on the exchange or lookup failed
    pub unresolved: usize,
}

/// Entry parameters decided by the engine
#[derive(Debug, Clone)]
pub struct EntryRequest {
    pub candle_ts: i64,
    pub price: Decimal,
    pub amount: Decimal,
    pub stop: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

/// Owns the order lifecycle for one pair.
///
/// Every order is keyed by a client id derived from the candle that produced
/// it, so entering or exiting twice on the same candle returns the order that
/// already exists instead of placing another one.
///
/// Live orders are stored as `pending` before they are sent. If the process
/// dies mid-submission, `reconcile_pending` settles them from the exchange's
/// view on the next run. Paper fills are local and stored in their final state.
pub struct OrderManager {
    orders: Arc<dyn OrderRepository>,
    execution: Arc<dyn ExecutionService>,
    mode: TradingMode,
    pair: String,
    metrics: Option<Metrics>,
}

impl OrderManager {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        execution: Arc<dyn ExecutionService>,
        mode: TradingMode,
        pair: impl Into<String>,
    ) -> Self {
        Self {
            orders,
            execution,
            mode,
            pair: pair.into(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The position held in the current mode, if any
    pub async fn position(&self) -> Result<Option<Position>> {
        Ok(self
            .orders
            .last_open(&self.pair)
            .await?
            .filter(|o| o.mode == self.mode)
            .map(|o| Position::from_order(&o)))
    }

    /// Quote balance plus base balance marked at `price`
    pub async fn equity(&self, price: Decimal) -> Result<Decimal> {
        let (base, quote) =
            split_pair(&self.pair).ok_or_else(|| anyhow!("Invalid pair {}", self.pair))?;
        let balances = self.execution.get_balances().await?;

        let quote_balance = balances.get(quote).copied().unwrap_or(Decimal::ZERO);
        let base_balance = balances.get(base).copied().unwrap_or(Decimal::ZERO);
        Ok(quote_balance + base_balance * price)
    }

    pub async fn enter(&self, request: EntryRequest) -> Result<Order> {
        let id = Order::client_id(&self.pair, request.candle_ts, OrderSide::Buy);
        if let Some(existing) = self.orders.find(&id).await? {
            info!(
                "OrderManager [{}]: entry for candle {} already recorded ({})",
                self.pair, request.candle_ts, existing.status
            );
            return Ok(existing);
        }

        let order = Order {
            id,
            exchange_id: None,
            pair: self.pair.clone(),
            side: OrderSide::Buy,
            price: request.price,
            amount: request.amount,
            stop: request.stop,
            take_profit: request.take_profit,
            status: OrderStatus::Pending,
            mode: self.mode,
            pnl: None,
            timestamp: request.candle_ts,
        };

        self.place(order).await
    }

    /// Sells the whole position at `price` and closes the entry order
    pub async fn exit(&self, position: &Position, candle_ts: i64, price: Decimal) -> Result<Order> {
        let id = Order::client_id(&self.pair, candle_ts, OrderSide::Sell);
        if let Some(existing) = self.orders.find(&id).await? {
            info!(
                "OrderManager [{}]: exit for candle {} already recorded ({})",
                self.pair, candle_ts, existing.status
            );
            return Ok(existing);
        }

        let order = Order {
            id,
            exchange_id: None,
            pair: self.pair.clone(),
            side: OrderSide::Sell,
            price,
            amount: position.amount,
            stop: None,
            take_profit: None,
            status: OrderStatus::Pending,
            mode: self.mode,
            pnl: Some(position.pnl_at(price)),
            timestamp: candle_ts,
        };

        let placed = self.place(order).await?;
        if placed.status == OrderStatus::Filled {
            return self.settle_exit(placed, position).await;
        }
        Ok(placed)
    }

    async fn place(&self, mut order: Order) -> Result<Order> {
        if !self.mode.is_live() {
            let report = self.execution.execute(&order).await?;
            order.exchange_id = report.exchange_id;
            order.price = report.fill_price.unwrap_or(order.price);
            order.status = settled_status(order.side);
            self.orders.insert(&order).await?;
            self.record(&order);
            return Ok(order);
        }

        self.orders.insert(&order).await?;

        match self.execution.execute(&order).await {
            Ok(report) => {
                order.status = settled_status(order.side);
                order.price = report.fill_price.unwrap_or(order.price);
                order.exchange_id = report.exchange_id;
                self.orders
                    .update_status(
                        &order.id,
                        order.status,
                        order.exchange_id.as_deref(),
                        report.fill_price,
                    )
                    .await?;
                self.record(&order);
                Ok(order)
            }
            Err(e) => {
                if let Some(ExchangeError::Rejected { status, message }) =
                    e.downcast_ref::<ExchangeError>()
                {
                    warn!(
                        "OrderManager [{}]: {} {} rejected ({}): {}",
                        self.pair, order.side, order.id, status, message
                    );
                    self.orders
                        .update_status(&order.id, OrderStatus::Rejected, None, None)
                        .await?;
                    order.status = OrderStatus::Rejected;
                    self.record(&order);
                    return Ok(order);
                }

                // Outcome unknown: leave it pending for reconciliation
                error!(
                    "OrderManager [{}]: submission of {} failed, left pending: {}",
                    self.pair, order.id, e
                );
                Err(e)
            }
        }
    }

    /// Marks the entry closed and books the realised PnL at the actual fill
    async fn settle_exit(&self, mut exit: Order, position: &Position) -> Result<Order> {
        let pnl = (exit.price - position.entry_price) * exit.amount;
        if exit.pnl != Some(pnl) {
            self.orders.set_pnl(&exit.id, pnl).await?;
            exit.pnl = Some(pnl);
        }
        self.orders
            .update_status(&position.order_id, OrderStatus::Closed, None, None)
            .await?;

        info!(
            "OrderManager [{}]: closed {} @ {} -> {} @ {}, pnl {}",
            self.pair, position.amount, position.entry_price, exit.amount, exit.price, pnl
        );
        Ok(exit)
    }

    /// Resolves orders left `pending` by an interrupted submission.
    ///
    /// A finished order with a fill is settled at the exchange's size and
    /// average price. An order the exchange does not know, or one that
    /// finished without filling, is rejected. Orders still working on the
    /// exchange, or whose lookup failed, stay pending and are counted as
    /// unresolved: no new order may go out while any remain.
    pub async fn reconcile_pending(&self) -> Result<Reconciliation> {
        let pending = self.orders.pending(&self.pair).await?;
        let mut report = Reconciliation::default();

        for order in pending {
            let remote = match self.execution.find_order(&order.id).await {
                Ok(remote) => remote,
                Err(e) => {
                    warn!(
                        "OrderManager [{}]: could not look up pending order {}: {}",
                        self.pair, order.id, e
                    );
                    report.unresolved += 1;
                    continue;
                }
            };

            match remote {
                Some(remote) if remote.is_working() => {
                    info!(
                        "OrderManager [{}]: pending {} {} still {} on the exchange",
                        self.pair, order.side, order.id, remote.status
                    );
                    report.unresolved += 1;
                    continue;
                }
                Some(remote) if remote.is_filled() => {
                    self.settle_remote(order, &remote).await?;
                }
                remote => {
                    warn!(
                        "OrderManager [{}]: pending order {} {}, marking rejected",
                        self.pair,
                        order.id,
                        match remote.and_then(|r| r.done_reason) {
                            Some(reason) => format!("done unfilled ({})", reason),
                            None => "unknown to exchange".to_string(),
                        }
                    );
                    self.orders
                        .update_status(&order.id, OrderStatus::Rejected, None, None)
                        .await?;
                }
            }
            report.resolved += 1;
        }

        Ok(report)
    }

    async fn settle_remote(&self, order: Order, remote: &RemoteOrder) -> Result<()> {
        let fill = remote.average_price();
        let status = settled_status(order.side);

        if remote.filled_size != order.amount {
            self.orders.set_amount(&order.id, remote.filled_size).await?;
        }
        self.orders
            .update_status(&order.id, status, Some(&remote.exchange_id), fill)
            .await?;
        info!(
            "OrderManager [{}]: reconciled {} {} as {} ({} @ {:?})",
            self.pair, order.side, order.id, status, remote.filled_size, fill
        );

        if order.side == OrderSide::Sell
            && let Some(entry) = self
                .orders
                .last_open(&self.pair)
                .await?
                .filter(|o| o.mode == order.mode)
        {
            let mut exit = order;
            exit.price = fill.unwrap_or(exit.price);
            exit.amount = remote.filled_size;
            exit.status = status;
            self.settle_exit(exit, &Position::from_order(&entry)).await?;
        }
        Ok(())
    }

    fn record(&self, order: &Order) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_orders(order.side.as_str(), order.status.as_str(), order.mode.as_str());
        }
    }
}

fn settled_status(side: OrderSide) -> OrderStatus {
    match side {
        OrderSide::Buy => OrderStatus::Open,
        OrderSide::Sell => OrderStatus::Filled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{ExecutionReport, RemoteOrder};
    use crate::infrastructure::paper::PaperExecutionService;
    use crate::infrastructure::persistence::database::Database;
    use crate::infrastructure::persistence::repositories::SqliteOrderRepository;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Exchange double: scripted responses, counts submissions
    #[derive(Default)]
    struct ScriptedExchange {
        submitted: Mutex<Vec<String>>,
        reject: bool,
        fail: bool,
        lookup_fails: bool,
        known: Mutex<HashMap<String, RemoteOrder>>,
    }

    impl ScriptedExchange {
        fn knowing(client_id: &str, remote: RemoteOrder) -> Arc<Self> {
            let exchange = Self::default();
            exchange
                .known
                .lock()
                .unwrap()
                .insert(client_id.to_string(), remote);
            Arc::new(exchange)
        }
    }

    fn remote(status: &str, reason: Option<&str>, size: Decimal, value: Decimal) -> RemoteOrder {
        RemoteOrder {
            exchange_id: "cb-1".to_string(),
            status: status.to_string(),
            done_reason: reason.map(str::to_string),
            filled_size: size,
            executed_value: value,
        }
    }

    #[async_trait]
    impl ExecutionService for ScriptedExchange {
        async fn execute(&self, order: &Order) -> Result<ExecutionReport> {
            self.submitted.lock().unwrap().push(order.id.clone());
            if self.reject {
                return Err(ExchangeError::Rejected {
                    status: 400,
                    message: "Insufficient funds".to_string(),
                }
                .into());
            }
            if self.fail {
                anyhow::bail!("connection reset");
            }
            Ok(ExecutionReport {
                exchange_id: Some(format!("cb-{}", order.id)),
                fill_price: None,
            })
        }

        async fn get_balances(&self) -> Result<HashMap<String, Decimal>> {
            Ok(HashMap::from([
                ("USD".to_string(), dec!(500)),
                ("BTC".to_string(), dec!(0.01)),
            ]))
        }

        async fn find_order(&self, client_id: &str) -> Result<Option<RemoteOrder>> {
            if self.lookup_fails {
                anyhow::bail!("lookup timed out");
            }
            Ok(self.known.lock().unwrap().get(client_id).cloned())
        }
    }

    async fn repo() -> Arc<dyn OrderRepository> {
        let db = Database::in_memory().await.unwrap();
        Arc::new(SqliteOrderRepository::new(db.pool.clone()))
    }

    fn entry(ts: i64) -> EntryRequest {
        EntryRequest {
            candle_ts: ts,
            price: dec!(100),
            amount: dec!(2),
            stop: Some(dec!(98)),
            take_profit: Some(dec!(102)),
        }
    }

    #[tokio::test]
    async fn test_live_entry_is_idempotent() {
        let orders = repo().await;
        let exchange = Arc::new(ScriptedExchange::default());
        let manager = OrderManager::new(orders.clone(), exchange.clone(), TradingMode::Live, "BTC-USD");

        let first = manager.enter(entry(0)).await.unwrap();
        let second = manager.enter(entry(0)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.status, OrderStatus::Open);
        assert_eq!(exchange.submitted.lock().unwrap().len(), 1);
        assert_eq!(orders.count().await.unwrap(), 1);
        assert!(manager.position().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rejected_order_opens_no_position() {
        let orders = repo().await;
        let exchange = Arc::new(ScriptedExchange {
            reject: true,
            ..Default::default()
        });
        let manager = OrderManager::new(orders.clone(), exchange, TradingMode::Live, "BTC-USD");

        let order = manager.enter(entry(0)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert!(manager.position().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_outcome_is_reconciled() {
        let orders = repo().await;
        let failing = Arc::new(ScriptedExchange {
            fail: true,
            ..Default::default()
        });
        let manager = OrderManager::new(orders.clone(), failing, TradingMode::Live, "BTC-USD");
        assert!(manager.enter(entry(0)).await.is_err());
        assert_eq!(orders.pending("BTC-USD").await.unwrap().len(), 1);

        // Next run: the exchange did receive and fill it
        let id = Order::client_id("BTC-USD", 0, OrderSide::Buy);
        let restarted = Arc::new(ScriptedExchange::default());
        restarted.known.lock().unwrap().insert(
            id.clone(),
            RemoteOrder {
                exchange_id: "cb-1".to_string(),
                status: "done".to_string(),
                done_reason: Some("filled".to_string()),
                filled_size: dec!(2),
                executed_value: dec!(201),
            },
        );
        let manager = OrderManager::new(orders.clone(), restarted.clone(), TradingMode::Live, "BTC-USD");

        let report = manager.reconcile_pending().await.unwrap();
        assert_eq!(report.resolved, 1);
        assert_eq!(report.unresolved, 0);
        let order = orders.find(&id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.price, dec!(100.5));
        assert_eq!(order.exchange_id.as_deref(), Some("cb-1"));
        assert!(restarted.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_never_accepted_is_rejected_on_reconcile() {
        let orders = repo().await;
        let failing = Arc::new(ScriptedExchange {
            fail: true,
            ..Default::default()
        });
        let manager = OrderManager::new(orders.clone(), failing, TradingMode::Live, "BTC-USD");
        let _ = manager.enter(entry(0)).await;

        let manager = OrderManager::new(
            orders.clone(),
            Arc::new(ScriptedExchange::default()),
            TradingMode::Live,
            "BTC-USD",
        );
        manager.reconcile_pending().await.unwrap();

        let id = Order::client_id("BTC-USD", 0, OrderSide::Buy);
        assert_eq!(
            orders.find(&id).await.unwrap().unwrap().status,
            OrderStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_paper_round_trip_books_pnl() {
        let orders = repo().await;
        let paper = Arc::new(PaperExecutionService::new(orders.clone(), "BTC-USD", dec!(1000)));
        let manager = OrderManager::new(orders.clone(), paper, TradingMode::Paper, "BTC-USD");

        manager.enter(entry(0)).await.unwrap();
        assert_eq!(manager.equity(dec!(110)).await.unwrap(), dec!(1020));

        let position = manager.position().await.unwrap().unwrap();
        let exit = manager.exit(&position, 900_000, dec!(105)).await.unwrap();

        assert_eq!(exit.status, OrderStatus::Filled);
        assert_eq!(exit.pnl, Some(dec!(10)));
        assert!(manager.position().await.unwrap().is_none());
        assert_eq!(manager.equity(dec!(50)).await.unwrap(), dec!(1010));
        assert!(orders.pending("BTC-USD").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_equity_marks_base_balance() {
        let manager = OrderManager::new(
            repo().await,
            Arc::new(ScriptedExchange::default()),
            TradingMode::Live,
            "BTC-USD",
        );
        assert_eq!(manager.equity(dec!(50000)).await.unwrap(), dec!(1000));
    }

    /// Leaves one pending buy for candle 0, as a crash mid-submission would
    async fn pending_entry(orders: &Arc<dyn OrderRepository>) -> String {
        let failing = Arc::new(ScriptedExchange {
            fail: true,
            ..Default::default()
        });
        let manager = OrderManager::new(orders.clone(), failing, TradingMode::Live, "BTC-USD");
        assert!(manager.enter(entry(0)).await.is_err());
        Order::client_id("BTC-USD", 0, OrderSide::Buy)
    }

    #[tokio::test]
    async fn test_failed_lookup_keeps_order_pending() {
        let orders = repo().await;
        let id = pending_entry(&orders).await;

        let unreachable = Arc::new(ScriptedExchange {
            lookup_fails: true,
            ..Default::default()
        });
        let manager = OrderManager::new(orders.clone(), unreachable, TradingMode::Live, "BTC-USD");

        let report = manager.reconcile_pending().await.unwrap();
        assert_eq!(report, Reconciliation { resolved: 0, unresolved: 1 });
        assert_eq!(
            orders.find(&id).await.unwrap().unwrap().status,
            OrderStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_working_order_stays_pending() {
        let orders = repo().await;
        let id = pending_entry(&orders).await;

        let exchange = ScriptedExchange::knowing(&id, remote("open", None, dec!(0), dec!(0)));
        let manager = OrderManager::new(orders.clone(), exchange, TradingMode::Live, "BTC-USD");

        let report = manager.reconcile_pending().await.unwrap();
        assert_eq!(report.unresolved, 1);
        assert_eq!(
            orders.find(&id).await.unwrap().unwrap().status,
            OrderStatus::Pending
        );
        assert!(manager.position().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_fill_settles_at_filled_size() {
        let orders = repo().await;
        let id = pending_entry(&orders).await;

        let exchange = ScriptedExchange::knowing(
            &id,
            remote("done", Some("filled"), dec!(1.5), dec!(151.5)),
        );
        let manager = OrderManager::new(orders.clone(), exchange, TradingMode::Live, "BTC-USD");

        assert_eq!(manager.reconcile_pending().await.unwrap().resolved, 1);
        let position = manager.position().await.unwrap().unwrap();
        assert_eq!(position.amount, dec!(1.5));
        assert_eq!(position.entry_price, dec!(101));
    }

    #[tokio::test]
    async fn test_done_without_fill_is_rejected() {
        let orders = repo().await;
        let id = pending_entry(&orders).await;

        let exchange =
            ScriptedExchange::knowing(&id, remote("done", Some("canceled"), dec!(0), dec!(0)));
        let manager = OrderManager::new(orders.clone(), exchange, TradingMode::Live, "BTC-USD");

        let report = manager.reconcile_pending().await.unwrap();
        assert_eq!(report, Reconciliation { resolved: 1, unresolved: 0 });
        assert_eq!(
            orders.find(&id).await.unwrap().unwrap().status,
            OrderStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_pending_exit_is_settled_at_exchange_fill() {
        let orders = repo().await;
        let healthy = Arc::new(ScriptedExchange::default());
        let manager = OrderManager::new(orders.clone(), healthy, TradingMode::Live, "BTC-USD");
        let entry_order = manager.enter(entry(0)).await.unwrap();
        let position = manager.position().await.unwrap().unwrap();

        // Exit submission dies in transport
        let failing = Arc::new(ScriptedExchange {
            fail: true,
            ..Default::default()
        });
        let manager = OrderManager::new(orders.clone(), failing, TradingMode::Live, "BTC-USD");
        assert!(manager.exit(&position, 900_000, dec!(105)).await.is_err());

        let sell_id = Order::client_id("BTC-USD", 900_000, OrderSide::Sell);
        assert_eq!(
            orders.find(&sell_id).await.unwrap().unwrap().status,
            OrderStatus::Pending
        );

        // Next run: the exchange filled the sell at 104
        let exchange = ScriptedExchange::knowing(
            &sell_id,
            remote("done", Some("filled"), dec!(2), dec!(208)),
        );
        let manager = OrderManager::new(orders.clone(), exchange.clone(), TradingMode::Live, "BTC-USD");
        assert_eq!(manager.reconcile_pending().await.unwrap().resolved, 1);

        let sell = orders.find(&sell_id).await.unwrap().unwrap();
        assert_eq!(sell.status, OrderStatus::Filled);
        assert_eq!(sell.price, dec!(104));
        assert_eq!(sell.pnl, Some(dec!(8)));
        assert_eq!(
            orders.find(&entry_order.id).await.unwrap().unwrap().status,
            OrderStatus::Closed
        );
        assert!(manager.position().await.unwrap().is_none());
        assert!(exchange.submitted.lock().unwrap().is_empty());
    }
}
