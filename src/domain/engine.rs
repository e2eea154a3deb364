//! Trading engine: lifecycle state machine and the signal-to-order loop.
//!
//! One iteration runs data → mark-to-market → signals → validation →
//! broker → ledger → metrics, strictly in sequence. The engine is the sole
//! owner and mutator of the [`PortfolioManager`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::config::TradingConfig;
use crate::domain::error::ScizorError;
use crate::domain::metrics::{MetricsCollector, MetricsSummary};
use crate::domain::ohlcv::last_close;
use crate::domain::order::{OrderSide, OrderStatus};
use crate::domain::portfolio::{PortfolioManager, PortfolioSummary};
use crate::domain::position::Position;
use crate::domain::signal::{Signal, SignalAction};
use crate::domain::strategy::{Strategy, StrategyContext};
use crate::ports::broker_port::Broker;
use crate::ports::data_port::{DataProvider, MarketData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Stopped => "stopped",
            EngineState::Starting => "starting",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Requests that a running [`TradingEngine::run_live`] loop end. The request
/// is observed between iterations and interrupts the inter-iteration sleep;
/// an iteration already in flight always completes.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

/// What happened during one iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IterationReport {
    pub timestamp: Option<DateTime<Utc>>,
    pub symbols_fetched: usize,
    pub signals_generated: usize,
    pub signals_executed: usize,
    pub signals_rejected: usize,
    pub orders_failed: usize,
    pub ledger_divergences: usize,
    pub total_value: f64,
    pub risk_violations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub strategy: String,
    pub broker_connected: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub portfolio: PortfolioSummary,
    pub positions: Vec<Position>,
    pub metrics: MetricsSummary,
}

enum Outcome {
    Executed,
    Rejected,
    Skipped,
    OrderFailed,
    Diverged,
}

pub struct TradingEngine {
    strategy: Box<dyn Strategy>,
    broker: Box<dyn Broker>,
    data: Box<dyn DataProvider>,
    portfolio: PortfolioManager,
    metrics: MetricsCollector,
    state: EngineState,
    last_update: Option<DateTime<Utc>>,
    enforce_exits: bool,
    update_frequency: Duration,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

impl TradingEngine {
    pub fn new(
        portfolio: PortfolioManager,
        strategy: Box<dyn Strategy>,
        broker: Box<dyn Broker>,
        data: Box<dyn DataProvider>,
    ) -> Self {
        let (tx, rx) = watch::channel(false);
        TradingEngine {
            strategy,
            broker,
            data,
            portfolio,
            metrics: MetricsCollector::default(),
            state: EngineState::Stopped,
            last_update: None,
            enforce_exits: false,
            update_frequency: Duration::from_secs(60),
            stop_tx: Arc::new(tx),
            stop_rx: rx,
        }
    }

    /// Engine wired from validated configuration.
    pub fn from_config(
        config: &TradingConfig,
        strategy: Box<dyn Strategy>,
        broker: Box<dyn Broker>,
        data: Box<dyn DataProvider>,
    ) -> Self {
        let portfolio = PortfolioManager::new(config.initial_capital, config.risk);
        TradingEngine::new(portfolio, strategy, broker, data)
            .with_metrics(MetricsCollector::new(config.engine.max_history))
            .with_enforce_exits(config.engine.enforce_exits)
            .with_update_frequency(config.engine.update_frequency)
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    /// Append full-quantity sells for positions past their stop-loss or
    /// take-profit level.
    pub fn with_enforce_exits(mut self, enforce: bool) -> Self {
        self.enforce_exits = enforce;
        self
    }

    pub fn with_update_frequency(mut self, frequency: Duration) -> Self {
        self.update_frequency = frequency;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn portfolio(&self) -> &PortfolioManager {
        &self.portfolio
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn broker(&self) -> &dyn Broker {
        self.broker.as_ref()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn update_frequency(&self) -> Duration {
        self.update_frequency
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: Arc::clone(&self.stop_tx),
        }
    }

    fn invalid_state(&self, operation: &str) -> ScizorError {
        ScizorError::InvalidState {
            state: self.state.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Connect the broker and enter `Running`. Only valid from `Stopped`; a
    /// failed or refused connection leaves the engine `Stopped`.
    pub async fn start(&mut self) -> Result<(), ScizorError> {
        if self.state != EngineState::Stopped {
            return Err(self.invalid_state("start"));
        }

        info!(strategy = self.strategy.name(), "starting trading engine");
        self.state = EngineState::Starting;
        self.stop_tx.send_replace(false);

        match self.broker.connect().await {
            Ok(true) => {
                self.state = EngineState::Running;
                info!("trading engine running");
                Ok(())
            }
            Ok(false) => {
                self.state = EngineState::Stopped;
                error!("broker refused connection");
                Err(ScizorError::NotConnected)
            }
            Err(e) => {
                self.state = EngineState::Stopped;
                error!(error = %e, "failed to connect to broker");
                Err(e)
            }
        }
    }

    /// Disconnect the broker. Always ends in `Stopped`.
    pub async fn stop(&mut self) {
        info!("stopping trading engine");
        self.state = EngineState::Stopping;
        if let Err(e) = self.broker.disconnect().await {
            warn!(error = %e, "broker disconnect failed");
        }
        self.state = EngineState::Stopped;
        info!("trading engine stopped");
    }

    /// Run one full iteration as of `current_time`.
    ///
    /// Per-signal broker failures, including a lost connection, are logged
    /// and the next signal is processed. Portfolio value and `last_update`
    /// are recorded on every iteration.
    pub async fn run_single_iteration(
        &mut self,
        current_time: DateTime<Utc>,
    ) -> Result<IterationReport, ScizorError> {
        let mut report = IterationReport {
            timestamp: Some(current_time),
            ..Default::default()
        };

        let symbols = self.strategy.get_required_symbols();
        let market_data = self.data.get_latest_data(&symbols).await;
        report.symbols_fetched = market_data.len();
        debug!(
            requested = symbols.len(),
            fetched = market_data.len(),
            "fetched market data"
        );

        self.mark_to_market(&market_data);

        let mut signals = {
            let ctx = StrategyContext::new(&self.portfolio, self.data.as_ref());
            self.strategy
                .generate_signals(&market_data, current_time, &ctx)
        };
        if self.enforce_exits {
            signals.extend(self.exit_signals(&signals, current_time));
        }
        report.signals_generated = signals.len();

        for signal in &signals {
            match self.process_signal(signal).await {
                Outcome::Executed => report.signals_executed += 1,
                Outcome::Rejected => report.signals_rejected += 1,
                Outcome::OrderFailed => report.orders_failed += 1,
                Outcome::Diverged => report.ledger_divergences += 1,
                Outcome::Skipped => {}
            }
        }

        report.total_value = self.portfolio.get_total_value();
        self.metrics
            .record_portfolio_value(report.total_value, current_time);
        self.last_update = Some(current_time);

        report.risk_violations = self.portfolio.check_risk_limits();
        for violation in &report.risk_violations {
            warn!(violation = %violation, "risk limit violated");
        }

        info!(
            signals = report.signals_generated,
            executed = report.signals_executed,
            total_value = report.total_value,
            "iteration complete"
        );
        Ok(report)
    }

    /// Iterate until stopped, sleeping `update_frequency` between
    /// iterations (the configured cadence when `None`). Ends with the broker
    /// disconnected.
    pub async fn run_live(
        &mut self,
        update_frequency: Option<Duration>,
    ) -> Result<(), ScizorError> {
        self.run_loop(update_frequency.unwrap_or(self.update_frequency), None)
            .await
    }

    /// As [`run_live`](Self::run_live) at the configured cadence, but stop
    /// after at most `limit` iterations.
    pub async fn run_iterations(&mut self, limit: u64) -> Result<(), ScizorError> {
        self.run_loop(self.update_frequency, Some(limit)).await
    }

    async fn run_loop(
        &mut self,
        frequency: Duration,
        limit: Option<u64>,
    ) -> Result<(), ScizorError> {
        if self.state != EngineState::Running {
            return Err(self.invalid_state("run"));
        }

        let mut stop_rx = self.stop_rx.clone();
        let mut completed: u64 = 0;
        let reached = |completed: u64| limit.is_some_and(|n| completed >= n);
        while self.state == EngineState::Running
            && !*stop_rx.borrow_and_update()
            && !reached(completed)
        {
            if let Err(e) = self.run_single_iteration(Utc::now()).await {
                error!(error = %e, "trading iteration failed");
            }
            completed += 1;
            if reached(completed) {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(frequency) => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if self.state == EngineState::Running {
            self.stop().await;
        }
        Ok(())
    }

    pub fn status(&self) -> EngineStatus {
        let mut positions: Vec<Position> = self.portfolio.positions().values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        EngineStatus {
            state: self.state,
            strategy: self.strategy.name().to_string(),
            broker_connected: self.broker.is_connected(),
            last_update: self.last_update,
            portfolio: self.portfolio.performance_summary(),
            positions,
            metrics: self.metrics.summary(self.last_update.unwrap_or_else(Utc::now)),
        }
    }

    fn mark_to_market(&mut self, market_data: &MarketData) {
        let prices: HashMap<String, f64> = market_data
            .iter()
            .filter(|(symbol, _)| self.portfolio.has_position(symbol))
            .filter_map(|(symbol, bars)| last_close(bars).map(|close| (symbol.clone(), close)))
            .collect();
        if !prices.is_empty() {
            self.portfolio.update_prices(&prices);
        }
    }

    fn exit_signals(&self, pending: &[Signal], current_time: DateTime<Utc>) -> Vec<Signal> {
        let already_selling: HashSet<&str> = pending
            .iter()
            .filter(|s| s.action() == SignalAction::Sell)
            .map(Signal::symbol)
            .collect();

        self.portfolio
            .exit_triggers()
            .into_iter()
            .filter(|t| !already_selling.contains(t.symbol.as_str()))
            .map(|t| {
                info!(symbol = %t.symbol, reason = ?t.reason, price = t.price, "exit triggered");
                Signal::new(t.symbol.as_str(), SignalAction::Sell, t.quantity, current_time)
                    .with_price(t.price)
                    .with_metadata("exit_reason", format!("{:?}", t.reason))
            })
            .collect()
    }

    async fn process_signal(&mut self, signal: &Signal) -> Outcome {
        self.metrics.record_signal(signal, self.strategy.name());

        let valid = {
            let ctx = StrategyContext::new(&self.portfolio, self.data.as_ref());
            self.strategy.validate_signal(signal, &ctx)
        };
        if !valid {
            warn!(
                symbol = signal.symbol(),
                action = %signal.action(),
                quantity = signal.quantity(),
                "signal rejected by validation"
            );
            return Outcome::Rejected;
        }

        let side = match signal.action() {
            SignalAction::Buy => OrderSide::Buy,
            SignalAction::Sell => OrderSide::Sell,
            SignalAction::Hold => return Outcome::Skipped,
        };

        let symbol = signal.symbol();
        let quantity = signal.quantity();
        let Some(price) = signal
            .price()
            .or_else(|| self.data.get_latest_price(symbol))
            .filter(|p| *p > 0.0)
        else {
            warn!(symbol, "no execution price available, dropping signal");
            return Outcome::Rejected;
        };

        let placed = match side {
            OrderSide::Buy => {
                self.broker
                    .place_buy_order(symbol, quantity, signal.price())
                    .await
            }
            OrderSide::Sell => {
                self.broker
                    .place_sell_order(symbol, quantity, signal.price())
                    .await
            }
        };
        let order = match placed {
            Ok(order) => order,
            Err(e) if e.is_connectivity() => {
                error!(
                    symbol,
                    side = %side,
                    error = %e,
                    "broker connection lost, order not placed"
                );
                return Outcome::OrderFailed;
            }
            Err(e) => {
                error!(symbol, side = %side, error = %e, "order placement failed");
                return Outcome::OrderFailed;
            }
        };
        if matches!(order.status, OrderStatus::Rejected | OrderStatus::Cancelled) {
            warn!(symbol, side = %side, status = %order.status, "order not filled");
            return Outcome::OrderFailed;
        }

        let applied = match side {
            OrderSide::Buy => {
                let ok = self.portfolio.add_position(symbol, quantity, price);
                if ok {
                    // A new position is valued at 0 until marked; mark it at
                    // the fill so total value does not drop by its cost.
                    let fill = HashMap::from([(symbol.to_string(), price)]);
                    self.portfolio.update_prices(&fill);
                    self.metrics
                        .record_trade(symbol, side, quantity, price, 0.0, signal.timestamp());
                }
                ok
            }
            OrderSide::Sell => {
                let avg_price = self.portfolio.get_position(symbol).map(|p| p.avg_price);
                let ok = self.portfolio.reduce_position(symbol, quantity, price);
                if ok {
                    let pnl = avg_price.map_or(0.0, |avg| (price - avg) * quantity as f64);
                    self.metrics
                        .record_trade(symbol, side, quantity, price, pnl, signal.timestamp());
                }
                ok
            }
        };

        if !applied {
            error!(
                symbol,
                side = %side,
                quantity,
                price,
                order_id = order.order_id.as_deref().unwrap_or(""),
                "ledger rejected a filled order; broker and ledger diverge"
            );
            return Outcome::Diverged;
        }

        info!(
            symbol,
            side = %side,
            quantity,
            price,
            order_id = order.order_id.as_deref().unwrap_or(""),
            "order executed"
        );
        Outcome::Executed
    }
}
