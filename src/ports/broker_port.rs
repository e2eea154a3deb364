//! Broker port trait.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::error::ScizorError;
use crate::domain::order::{Order, OrderSide};

/// A holding as reported by the broker. Never reconciled with the local ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub quantity: i64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountInfo {
    pub account_id: String,
    pub cash: f64,
    pub buying_power: f64,
    pub positions_value: f64,
    pub total_value: f64,
    pub paper_trading: bool,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// `Ok(false)` means the broker refused the session without a transport error.
    async fn connect(&mut self) -> Result<bool, ScizorError>;

    async fn disconnect(&mut self) -> Result<(), ScizorError>;

    /// Submit an order. On success the broker writes `order_id` and `status`
    /// into `order` and returns the id. Fails with `NotConnected` when no
    /// session is open.
    async fn place_order(&mut self, order: &mut Order) -> Result<String, ScizorError>;

    /// `Ok(false)` for unknown order ids.
    async fn cancel_order(&mut self, order_id: &str) -> Result<bool, ScizorError>;

    async fn get_order_status(&self, order_id: &str) -> Result<Option<Order>, ScizorError>;

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, ScizorError>;

    async fn get_account_info(&self) -> Result<AccountInfo, ScizorError>;

    fn is_connected(&self) -> bool;

    /// Market buy when `price` is `None`, limit buy otherwise.
    async fn place_buy_order(
        &mut self,
        symbol: &str,
        quantity: i64,
        price: Option<f64>,
    ) -> Result<Order, ScizorError> {
        let mut order = build_order(symbol, OrderSide::Buy, quantity, price);
        self.place_order(&mut order).await?;
        Ok(order)
    }

    /// Market sell when `price` is `None`, limit sell otherwise.
    async fn place_sell_order(
        &mut self,
        symbol: &str,
        quantity: i64,
        price: Option<f64>,
    ) -> Result<Order, ScizorError> {
        let mut order = build_order(symbol, OrderSide::Sell, quantity, price);
        self.place_order(&mut order).await?;
        Ok(order)
    }
}

fn build_order(symbol: &str, side: OrderSide, quantity: i64, price: Option<f64>) -> Order {
    match price {
        Some(p) => Order::limit(symbol, side, quantity, p),
        None => Order::market(symbol, side, quantity),
    }
}
