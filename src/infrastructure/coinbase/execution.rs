//! Coinbase Exchange order execution and account balances
//!
//! Orders are market orders tagged with `client_oid`, so an order whose
//! submission outcome is unknown can be looked up later through
//! `GET /orders/client:{client_oid}`.

use super::auth::RequestSigner;
use crate::domain::errors::ExchangeError;
use crate::domain::ports::{ExecutionReport, ExecutionService, RemoteOrder};
use crate::domain::trading::types::Order;
use crate::infrastructure::core::circuit_breaker::CircuitBreaker;
use crate::infrastructure::core::http_client_factory::{
    HttpClientFactory, build_url, request_path,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

pub struct CoinbaseExecutionService {
    client: ClientWithMiddleware,
    order_client: ClientWithMiddleware,
    base_url: String,
    signer: RequestSigner,
    circuit_breaker: Arc<CircuitBreaker>,
}

#[derive(Debug, Serialize)]
struct NewOrderRequest<'a> {
    #[serde(rename = "type")]
    order_type: &'a str,
    side: &'a str,
    product_id: &'a str,
    size: String,
    client_oid: &'a str,
}

#[derive(Debug, Deserialize)]
struct NewOrderResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    currency: String,
    balance: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    filled_size: Option<String>,
    #[serde(default)]
    executed_value: Option<String>,
}

impl OrderResponse {
    fn into_remote(self) -> RemoteOrder {
        let parse = |v: Option<String>| {
            v.and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(Decimal::ZERO)
        };
        RemoteOrder {
            exchange_id: self.id,
            status: self.status,
            done_reason: self.done_reason,
            filled_size: parse(self.filled_size),
            executed_value: parse(self.executed_value),
        }
    }
}

impl CoinbaseExecutionService {
    pub fn new(base_url: impl Into<String>, signer: RequestSigner) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            order_client: HttpClientFactory::create_order_client(),
            base_url: base_url.into(),
            signer,
            circuit_breaker: Arc::new(CircuitBreaker::for_exchange("CoinbaseExecution")),
        }
    }

    async fn rejected(response: reqwest::Response) -> anyhow::Error {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        ExchangeError::Rejected { status, message }.into()
    }

    async fn place_order(&self, order: &Order) -> Result<ExecutionReport> {
        let url = build_url(&self.base_url, "/orders", &[])?;
        let path = request_path(&url);

        let request = NewOrderRequest {
            order_type: "market",
            side: order.side.as_str(),
            product_id: &order.pair,
            size: order.amount.normalize().to_string(),
            client_oid: &order.id,
        };
        let body = serde_json::to_string(&request).context("Failed to encode order")?;

        let response = self
            .signer
            .authorize(self.order_client.post(url.as_str()), "POST", &path, &body)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .context("Failed to submit order to Coinbase")?;

        if response.status().is_client_error() {
            return Err(Self::rejected(response).await);
        }
        // A 5xx says nothing about whether the order landed
        if !response.status().is_success() {
            anyhow::bail!("Coinbase order submission failed: {}", response.status());
        }

        let accepted: NewOrderResponse = response
            .json()
            .await
            .context("Failed to parse Coinbase order response")?;

        info!(
            "CoinbaseExecution: {} {} {} accepted as {}",
            order.side, order.amount, order.pair, accepted.id
        );

        Ok(ExecutionReport {
            exchange_id: Some(accepted.id),
            fill_price: None,
        })
    }

    async fn fetch_accounts(&self) -> Result<HashMap<String, Decimal>> {
        let url = build_url(&self.base_url, "/accounts", &[])?;
        let path = request_path(&url);

        let response = self
            .signer
            .authorize(self.client.get(url.as_str()), "GET", &path, "")
            .send()
            .await
            .context("Failed to fetch Coinbase accounts")?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let accounts: Vec<AccountResponse> = response
            .json()
            .await
            .context("Failed to parse Coinbase accounts response")?;

        let mut balances = HashMap::new();
        for account in accounts {
            match Decimal::from_str(&account.balance) {
                Ok(balance) => {
                    *balances.entry(account.currency).or_insert(Decimal::ZERO) += balance;
                }
                Err(e) => warn!(
                    "CoinbaseExecution: ignoring {} balance '{}': {}",
                    account.currency, account.balance, e
                ),
            }
        }
        Ok(balances)
    }

    async fn fetch_order(&self, client_id: &str) -> Result<Option<RemoteOrder>> {
        let url = build_url(&self.base_url, &format!("/orders/client:{}", client_id), &[])?;
        let path = request_path(&url);

        let response = self
            .signer
            .authorize(self.client.get(url.as_str()), "GET", &path, "")
            .send()
            .await
            .with_context(|| format!("Failed to look up order {}", client_id))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let order: OrderResponse = response
            .json()
            .await
            .context("Failed to parse Coinbase order lookup")?;
        Ok(Some(order.into_remote()))
    }
}

#[async_trait]
impl ExecutionService for CoinbaseExecutionService {
    async fn execute(&self, order: &Order) -> Result<ExecutionReport> {
        self.circuit_breaker
            .call(self.place_order(order))
            .await
            .map_err(|e| e.into_anyhow())
    }

    async fn get_balances(&self) -> Result<HashMap<String, Decimal>> {
        self.circuit_breaker
            .call(self.fetch_accounts())
            .await
            .map_err(|e| e.into_anyhow())
    }

    async fn find_order(&self, client_id: &str) -> Result<Option<RemoteOrder>> {
        self.circuit_breaker
            .call(self.fetch_order(client_id))
            .await
            .map_err(|e| e.into_anyhow())
    }
}
