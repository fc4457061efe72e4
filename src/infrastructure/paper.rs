//! Paper execution
//!
//! Fills every order locally at its reference price. Nothing is sent to the
//! exchange; balances are rebuilt from the order history so paper equity
//! survives restarts.

use crate::domain::ports::{ExecutionReport, ExecutionService, RemoteOrder};
use crate::domain::repositories::OrderRepository;
use crate::domain::trading::types::{Order, OrderStatus, TradingMode, split_pair};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub struct PaperExecutionService {
    orders: Arc<dyn OrderRepository>,
    pair: String,
    starting_equity: Decimal,
}

impl PaperExecutionService {
    pub fn new(orders: Arc<dyn OrderRepository>, pair: impl Into<String>, starting_equity: Decimal) -> Self {
        Self {
            orders,
            pair: pair.into(),
            starting_equity,
        }
    }
}

#[async_trait]
impl ExecutionService for PaperExecutionService {
    async fn execute(&self, order: &Order) -> Result<ExecutionReport> {
        let exchange_id = format!("paper-{}", uuid::Uuid::new_v4());
        info!(
            "PAPER {} {} {} @ {} ({})",
            order.side, order.amount, order.pair, order.price, exchange_id
        );
        Ok(ExecutionReport {
            exchange_id: Some(exchange_id),
            fill_price: Some(order.price),
        })
    }

    /// Quote balance = starting equity + realised PnL - cost of the open position.
    /// Base balance = size of the open position.
    async fn get_balances(&self) -> Result<HashMap<String, Decimal>> {
        let (base, quote) =
            split_pair(&self.pair).ok_or_else(|| anyhow!("Invalid pair {}", self.pair))?;

        let realized = self.orders.realized_pnl(&self.pair, TradingMode::Paper).await?;
        let open = self
            .orders
            .last_open(&self.pair)
            .await?
            .filter(|o| o.mode == TradingMode::Paper);

        let (held, cost) = match open {
            Some(o) => (o.amount, o.amount * o.price),
            None => (Decimal::ZERO, Decimal::ZERO),
        };

        let mut balances = HashMap::new();
        balances.insert(quote.to_string(), self.starting_equity + realized - cost);
        balances.insert(base.to_string(), held);
        Ok(balances)
    }

    /// A paper order only "exists" once it has left the pending state
    async fn find_order(&self, client_id: &str) -> Result<Option<RemoteOrder>> {
        let Some(order) = self.orders.find(client_id).await? else {
            return Ok(None);
        };
        if order.status == OrderStatus::Pending {
            return Ok(None);
        }

        Ok(Some(RemoteOrder {
            exchange_id: order.exchange_id.unwrap_or_else(|| order.id.clone()),
            status: "done".to_string(),
            done_reason: Some("filled".to_string()),
            filled_size: order.amount,
            executed_value: order.amount * order.price,
        }))
    }
}
