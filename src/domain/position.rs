//! Position tracking.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A holding of one symbol. Owned exclusively by the portfolio manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub avg_price: f64,
    /// Last mark price; 0 until the first price update.
    pub current_price: f64,
    pub last_updated: DateTime<Utc>,
}

impl Position {
    pub fn new(symbol: &str, quantity: i64, avg_price: f64) -> Self {
        Position {
            symbol: symbol.to_string(),
            quantity,
            avg_price,
            current_price: 0.0,
            last_updated: Utc::now(),
        }
    }

    pub fn value(&self) -> f64 {
        self.quantity as f64 * self.current_price
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity as f64 * self.avg_price
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.value() - self.cost_basis()
    }

    pub fn unrealized_pnl_pct(&self) -> f64 {
        let basis = self.cost_basis();
        if basis == 0.0 {
            return 0.0;
        }
        self.unrealized_pnl() / basis * 100.0
    }

    pub fn has_mark(&self) -> bool {
        self.current_price > 0.0
    }

    /// Mark at or below `avg_price * (1 - stop_loss)`. Unmarked positions never trigger.
    pub fn should_stop_loss(&self, stop_loss: f64) -> bool {
        if stop_loss <= 0.0 || !self.has_mark() {
            return false;
        }
        self.current_price <= self.avg_price * (1.0 - stop_loss)
    }

    /// Mark at or above `avg_price * (1 + take_profit)`. Unmarked positions never trigger.
    pub fn should_take_profit(&self, take_profit: f64) -> bool {
        if take_profit <= 0.0 || !self.has_mark() {
            return false;
        }
        self.current_price >= self.avg_price * (1.0 + take_profit)
    }
}
