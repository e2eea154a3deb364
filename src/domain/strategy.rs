//! Strategy contract.
//!
//! A strategy turns market data into signals. It never mutates the portfolio;
//! it reads the ledger and the data provider through a [`StrategyContext`]
//! borrowed for the duration of one call.

use chrono::{DateTime, Utc};

use crate::domain::indicator::Indicators;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::portfolio::PortfolioManager;
use crate::domain::signal::{Signal, SignalAction};
use crate::ports::data_port::{DataProvider, MarketData};

pub const DEFAULT_POSITION_FRACTION: f64 = 0.10;

/// Read-only view of the engine's collaborators.
#[derive(Clone, Copy)]
pub struct StrategyContext<'a> {
    pub portfolio: &'a PortfolioManager,
    pub data: &'a dyn DataProvider,
}

impl<'a> StrategyContext<'a> {
    pub fn new(portfolio: &'a PortfolioManager, data: &'a dyn DataProvider) -> Self {
        StrategyContext { portfolio, data }
    }

    /// Latest provider price, ignoring non-positive quotes.
    pub fn current_price(&self, symbol: &str) -> Option<f64> {
        self.data.get_latest_price(symbol).filter(|p| *p > 0.0)
    }
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn get_required_symbols(&self) -> Vec<String>;

    fn calculate_indicators(&self, bars: &[OhlcvBar]) -> Indicators;

    /// Signals in discovery order over the required symbols.
    fn generate_signals(
        &self,
        market_data: &MarketData,
        current_time: DateTime<Utc>,
        ctx: &StrategyContext<'_>,
    ) -> Vec<Signal>;

    /// Fraction of total portfolio value to commit per new position.
    fn position_fraction(&self) -> f64 {
        DEFAULT_POSITION_FRACTION
    }

    /// Whole shares worth `position_fraction` of total value, scaled by
    /// `signal_strength`. 0 when the provider has no price.
    fn get_position_size(
        &self,
        symbol: &str,
        signal_strength: f64,
        ctx: &StrategyContext<'_>,
    ) -> i64 {
        let Some(price) = ctx.current_price(symbol) else {
            return 0;
        };
        let budget = ctx.portfolio.get_total_value() * self.position_fraction();
        let shares = (budget / price * signal_strength).floor();
        if shares.is_finite() && shares > 0.0 {
            shares as i64
        } else {
            0
        }
    }

    /// Pre-trade check. Only the existing position is considered for the
    /// size limit; other signals pending in the same batch are not.
    fn validate_signal(&self, signal: &Signal, ctx: &StrategyContext<'_>) -> bool {
        if signal.action() != SignalAction::Hold && signal.quantity() <= 0 {
            return false;
        }

        if signal.action() == SignalAction::Buy {
            let portfolio = ctx.portfolio;
            let existing = portfolio
                .get_position(signal.symbol())
                .map_or(0.0, |p| p.value());
            let price = signal
                .price()
                .or_else(|| ctx.current_price(signal.symbol()))
                .unwrap_or(0.0);
            let limit = portfolio.get_total_value() * portfolio.risk_settings().max_position_size;
            if existing + signal.quantity() as f64 * price > limit {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::error::ScizorError;
    use crate::domain::ohlcv::Interval;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    /// Provider with fixed quotes and no history.
    #[derive(Default)]
    pub struct QuoteProvider {
        pub prices: HashMap<String, f64>,
    }

    impl QuoteProvider {
        pub fn with_price(mut self, symbol: &str, price: f64) -> Self {
            self.prices.insert(symbol.to_string(), price);
            self
        }
    }

    #[async_trait]
    impl DataProvider for QuoteProvider {
        async fn get_historical_data(
            &self,
            symbol: &str,
            _start_date: NaiveDate,
            _end_date: NaiveDate,
            _interval: Interval,
        ) -> Result<Vec<OhlcvBar>, ScizorError> {
            Err(ScizorError::NoData {
                symbol: symbol.to_string(),
            })
        }

        async fn get_latest_data(&self, _symbols: &[String]) -> MarketData {
            MarketData::new()
        }

        fn get_latest_price(&self, symbol: &str) -> Option<f64> {
            self.prices.get(symbol).copied()
        }
    }
}
