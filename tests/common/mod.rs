#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use scizor::domain::error::ScizorError;
use scizor::domain::indicator::Indicators;
use scizor::domain::ohlcv::{Interval, OhlcvBar};
use scizor::domain::order::Order;
use scizor::domain::signal::Signal;
use scizor::domain::strategy::{Strategy, StrategyContext};
use scizor::ports::broker_port::{AccountInfo, Broker, BrokerPosition};
use scizor::ports::data_port::{DataProvider, MarketData};
use std::sync::{Arc, Mutex};

/// Provider whose bars can be swapped between iterations. Clones share state.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    bars: Arc<Mutex<MarketData>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.set_bars(symbol, bars);
        self
    }

    pub fn set_bars(&self, symbol: &str, bars: Vec<OhlcvBar>) {
        self.bars.lock().unwrap().insert(symbol.to_string(), bars);
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    async fn get_historical_data(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<OhlcvBar>, ScizorError> {
        let bars: Vec<OhlcvBar> = self
            .bars
            .lock()
            .unwrap()
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(ScizorError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(interval.apply(bars))
    }

    async fn get_latest_data(&self, symbols: &[String]) -> MarketData {
        let bars = self.bars.lock().unwrap();
        symbols
            .iter()
            .filter_map(|s| {
                bars.get(s)
                    .filter(|b| !b.is_empty())
                    .map(|b| (s.clone(), b.clone()))
            })
            .collect()
    }

    fn get_latest_price(&self, symbol: &str) -> Option<f64> {
        self.bars
            .lock()
            .unwrap()
            .get(symbol)
            .and_then(|b| b.last())
            .map(|b| b.close)
    }
}

/// Broker that connects but fails every order with the given error.
pub struct FailingBroker {
    connected: bool,
    not_connected: bool,
}

impl FailingBroker {
    /// Orders fail with a plain broker rejection.
    pub fn rejecting() -> Self {
        FailingBroker {
            connected: false,
            not_connected: false,
        }
    }

    /// Orders fail as if the session dropped.
    pub fn disconnected() -> Self {
        FailingBroker {
            connected: false,
            not_connected: true,
        }
    }
}

#[async_trait]
impl Broker for FailingBroker {
    async fn connect(&mut self) -> Result<bool, ScizorError> {
        self.connected = true;
        Ok(true)
    }

    async fn disconnect(&mut self) -> Result<(), ScizorError> {
        self.connected = false;
        Ok(())
    }

    async fn place_order(&mut self, _order: &mut Order) -> Result<String, ScizorError> {
        if self.not_connected {
            Err(ScizorError::NotConnected)
        } else {
            Err(ScizorError::broker("exchange closed"))
        }
    }

    async fn cancel_order(&mut self, _order_id: &str) -> Result<bool, ScizorError> {
        Ok(false)
    }

    async fn get_order_status(&self, _order_id: &str) -> Result<Option<Order>, ScizorError> {
        Ok(None)
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, ScizorError> {
        Ok(Vec::new())
    }

    async fn get_account_info(&self) -> Result<AccountInfo, ScizorError> {
        Err(ScizorError::broker("exchange closed"))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Strategy that watches symbols but never trades.
pub struct IdleStrategy {
    pub symbols: Vec<String>,
}

impl IdleStrategy {
    pub fn new(symbols: &[&str]) -> Self {
        IdleStrategy {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Strategy for IdleStrategy {
    fn name(&self) -> &str {
        "idle"
    }

    fn get_required_symbols(&self) -> Vec<String> {
        self.symbols.clone()
    }

    fn calculate_indicators(&self, _bars: &[OhlcvBar]) -> Indicators {
        Indicators::new()
    }

    fn generate_signals(
        &self,
        _market_data: &MarketData,
        _current_time: DateTime<Utc>,
        _ctx: &StrategyContext<'_>,
    ) -> Vec<Signal> {
        Vec::new()
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 16, 0, 0).unwrap()
}

pub fn make_bar(symbol: &str, date: NaiveDate, close: f64) -> OhlcvBar {
    OhlcvBar {
        symbol: symbol.to_string(),
        date,
        open: close,
        high: close + 1.0,
        low: (close - 1.0).max(0.01),
        close,
        volume: 1000,
        adjusted_close: None,
    }
}

/// Consecutive daily bars starting 2024-01-01.
pub fn bars_from_closes(symbol: &str, closes: &[f64]) -> Vec<OhlcvBar> {
    let start = date(2024, 1, 1);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_bar(symbol, start + Duration::days(i as i64), close))
        .collect()
}
