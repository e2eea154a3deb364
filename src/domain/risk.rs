//! Risk limit settings.

use serde::Serialize;

/// Immutable risk configuration supplied to the portfolio manager at construction.
///
/// All values are fractions: `max_position_size` of total portfolio value,
/// `stop_loss`/`take_profit` relative to the average price, `max_drawdown`
/// relative to the peak portfolio value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskSettings {
    pub max_position_size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub max_drawdown: f64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        RiskSettings {
            max_position_size: 0.10,
            stop_loss: 0.02,
            take_profit: 0.06,
            max_drawdown: 0.15,
        }
    }
}
