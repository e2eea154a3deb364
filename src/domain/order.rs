//! Broker-facing orders.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("buy"),
            OrderSide::Sell => f.write_str("sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    #[default]
    Market,
    Limit,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Submitted,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// An order owned by its submitter. `order_id` and `status` are written by the broker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub order_type: OrderType,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub order_id: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn market(symbol: &str, side: OrderSide, quantity: i64) -> Self {
        Order {
            symbol: symbol.to_string(),
            side,
            quantity,
            order_type: OrderType::Market,
            price: None,
            stop_price: None,
            order_id: None,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn limit(symbol: &str, side: OrderSide, quantity: i64, price: f64) -> Self {
        Order {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Order::market(symbol, side, quantity)
        }
    }

    pub fn stop(symbol: &str, side: OrderSide, quantity: i64, stop_price: f64) -> Self {
        Order {
            order_type: OrderType::Stop,
            stop_price: Some(stop_price),
            ..Order::market(symbol, side, quantity)
        }
    }

    pub fn notional(&self, reference_price: f64) -> f64 {
        self.quantity as f64 * self.price.unwrap_or(reference_price)
    }
}
