//! Portfolio ledger: cash, positions, risk limits and drawdown.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;

use super::position::Position;
use super::risk::RiskSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

/// A held position whose mark has crossed its stop-loss or take-profit level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitTrigger {
    pub symbol: String,
    pub quantity: i64,
    pub price: f64,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub initial_capital: f64,
    pub current_value: f64,
    pub cash_balance: f64,
    pub positions_value: f64,
    pub total_return: f64,
    pub total_return_pct: f64,
    pub current_drawdown: f64,
    pub peak_value: f64,
    pub number_of_positions: usize,
}

/// Aggregate root for the simulated account.
///
/// Mutating operations take `&mut self`; callers that share a manager must
/// wrap it in a lock so that exactly one writer exists at a time.
#[derive(Debug, Clone)]
pub struct PortfolioManager {
    initial_capital: f64,
    cash_balance: f64,
    positions: HashMap<String, Position>,
    risk: RiskSettings,
    peak_value: f64,
    current_drawdown: f64,
}

impl PortfolioManager {
    pub fn new(initial_capital: f64, risk: RiskSettings) -> Self {
        PortfolioManager {
            initial_capital,
            cash_balance: initial_capital,
            positions: HashMap::new(),
            risk,
            peak_value: initial_capital,
            current_drawdown: 0.0,
        }
    }

    /// Buy `quantity` shares at `price`.
    ///
    /// Returns `false` without mutating anything when the cost exceeds cash or
    /// the resulting position would exceed `max_position_size` of total value.
    /// The size check values the existing holding at its last mark.
    pub fn add_position(&mut self, symbol: &str, quantity: i64, price: f64) -> bool {
        if quantity <= 0 || !(price > 0.0) {
            return false;
        }

        let cost = quantity as f64 * price;
        if cost > self.cash_balance {
            return false;
        }

        let total_value = self.get_total_value();
        let existing_value = self.positions.get(symbol).map_or(0.0, Position::value);
        if existing_value + cost > total_value * self.risk.max_position_size {
            return false;
        }

        match self.positions.get_mut(symbol) {
            Some(position) => {
                let total_quantity = position.quantity + quantity;
                let total_cost = position.cost_basis() + cost;
                position.avg_price = total_cost / total_quantity as f64;
                position.quantity = total_quantity;
                position.last_updated = Utc::now();
            }
            None => {
                self.positions
                    .insert(symbol.to_string(), Position::new(symbol, quantity, price));
            }
        }

        self.cash_balance -= cost;
        true
    }

    /// Sell `quantity` shares at `price`.
    ///
    /// The average price of a partially reduced position is left unchanged;
    /// realised P&L is not tracked by the ledger.
    pub fn reduce_position(&mut self, symbol: &str, quantity: i64, price: f64) -> bool {
        let Some(position) = self.positions.get_mut(symbol) else {
            return false;
        };
        if quantity <= 0 || quantity > position.quantity || !(price > 0.0) {
            return false;
        }

        let proceeds = quantity as f64 * price;

        if quantity == position.quantity {
            self.positions.remove(symbol);
        } else {
            position.quantity -= quantity;
            position.last_updated = Utc::now();
        }

        self.cash_balance += proceeds;
        true
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn cash_balance(&self) -> f64 {
        self.cash_balance
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn risk_settings(&self) -> &RiskSettings {
        &self.risk
    }

    pub fn peak_value(&self) -> f64 {
        self.peak_value
    }

    /// Drawdown as of the last `calculate_drawdown` call.
    pub fn current_drawdown(&self) -> f64 {
        self.current_drawdown
    }

    pub fn get_positions_value(&self) -> f64 {
        self.positions.values().map(Position::value).sum()
    }

    /// Cash plus every position at its last mark (0 for unmarked positions).
    pub fn get_total_value(&self) -> f64 {
        self.cash_balance + self.get_positions_value()
    }

    /// Set mark prices for held symbols; symbols not held are ignored.
    pub fn update_prices(&mut self, prices: &HashMap<String, f64>) {
        let now = Utc::now();
        for (symbol, &price) in prices {
            if let Some(position) = self.positions.get_mut(symbol) {
                position.current_price = price;
                position.last_updated = now;
            }
        }
    }

    /// Raise the peak watermark if exceeded and return `(peak - current) / peak`.
    pub fn calculate_drawdown(&mut self) -> f64 {
        let current_value = self.get_total_value();
        if current_value > self.peak_value {
            self.peak_value = current_value;
        }

        self.current_drawdown = if self.peak_value > 0.0 {
            (self.peak_value - current_value) / self.peak_value
        } else {
            0.0
        };

        self.current_drawdown
    }

    /// Human-readable descriptions of every breached limit; empty when compliant.
    pub fn check_risk_limits(&mut self) -> Vec<String> {
        let mut violations = Vec::new();

        let drawdown = self.calculate_drawdown();
        if drawdown > self.risk.max_drawdown {
            violations.push(format!(
                "Drawdown {:.2}% exceeds limit {:.2}%",
                drawdown * 100.0,
                self.risk.max_drawdown * 100.0
            ));
        }

        let total_value = self.get_total_value();
        let mut symbols: Vec<&String> = self.positions.keys().collect();
        symbols.sort();
        for symbol in symbols {
            let position = &self.positions[symbol];
            let fraction = if total_value > 0.0 {
                position.value() / total_value
            } else {
                0.0
            };
            if fraction > self.risk.max_position_size {
                violations.push(format!(
                    "Position {} {:.2}% exceeds limit {:.2}%",
                    symbol,
                    fraction * 100.0,
                    self.risk.max_position_size * 100.0
                ));
            }
        }

        violations
    }

    /// Positions whose mark has crossed the configured stop-loss or take-profit level.
    pub fn exit_triggers(&self) -> Vec<ExitTrigger> {
        let mut triggers: Vec<ExitTrigger> = self
            .positions
            .values()
            .filter_map(|pos| {
                let reason = if pos.should_stop_loss(self.risk.stop_loss) {
                    ExitReason::StopLoss
                } else if pos.should_take_profit(self.risk.take_profit) {
                    ExitReason::TakeProfit
                } else {
                    return None;
                };
                Some(ExitTrigger {
                    symbol: pos.symbol.clone(),
                    quantity: pos.quantity,
                    price: pos.current_price,
                    reason,
                })
            })
            .collect();
        triggers.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        triggers
    }

    pub fn performance_summary(&self) -> PortfolioSummary {
        let current_value = self.get_total_value();
        let total_return = if self.initial_capital > 0.0 {
            (current_value - self.initial_capital) / self.initial_capital
        } else {
            0.0
        };

        PortfolioSummary {
            initial_capital: self.initial_capital,
            current_value,
            cash_balance: self.cash_balance,
            positions_value: self.get_positions_value(),
            total_return,
            total_return_pct: total_return * 100.0,
            current_drawdown: self.current_drawdown,
            peak_value: self.peak_value,
            number_of_positions: self.positions.len(),
        }
    }
}
