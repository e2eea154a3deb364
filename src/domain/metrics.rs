//! Runtime metrics: portfolio value series, trade and signal journals,
//! daily returns and derived performance statistics.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use super::order::OrderSide;
use super::signal::{Signal, SignalAction};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

pub const DEFAULT_MAX_HISTORY: usize = 10_000;
pub const DEFAULT_SHARPE_WINDOW: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuePoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnPoint {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "return")]
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: OrderSide,
    pub quantity: i64,
    pub price: f64,
    pub pnl: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: SignalAction,
    pub quantity: i64,
    pub confidence: f64,
    pub strategy: String,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Lifetime trade statistics; unaffected by history eviction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_pnl: f64,
    pub max_win: f64,
    pub max_loss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub period_days: i64,
    pub total_return: f64,
    pub total_return_pct: f64,
    pub avg_daily_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: Option<f64>,
    pub trade_count: usize,
    pub win_rate: f64,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub start_value: f64,
    pub end_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeSummary {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl_per_trade: f64,
    pub max_win: f64,
    pub max_loss: f64,
    pub profit_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoints {
    pub portfolio_values: usize,
    pub trades: usize,
    pub signals: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub performance_7d: Option<PerformanceMetrics>,
    pub performance_30d: Option<PerformanceMetrics>,
    pub trade_summary: TradeSummary,
    pub current_sharpe: Option<f64>,
    pub data_points: DataPoints,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsExport {
    pub portfolio_values: Vec<ValuePoint>,
    pub trade_history: Vec<TradeRecord>,
    pub signal_history: Vec<SignalRecord>,
    pub daily_returns: Vec<ReturnPoint>,
    pub trade_stats: TradeStats,
    pub export_timestamp: DateTime<Utc>,
}

/// Passive observer of the engine. Every series is a bounded FIFO holding at
/// most `max_history` entries; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    max_history: usize,
    portfolio_values: VecDeque<ValuePoint>,
    trade_history: VecDeque<TradeRecord>,
    signal_history: VecDeque<SignalRecord>,
    daily_returns: VecDeque<ReturnPoint>,
    trade_stats: TradeStats,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        MetricsCollector::new(DEFAULT_MAX_HISTORY)
    }
}

fn push_bounded<T>(series: &mut VecDeque<T>, item: T, max: usize) {
    if max == 0 {
        return;
    }
    while series.len() >= max {
        series.pop_front();
    }
    series.push_back(item);
}

impl MetricsCollector {
    pub fn new(max_history: usize) -> Self {
        MetricsCollector {
            max_history,
            portfolio_values: VecDeque::new(),
            trade_history: VecDeque::new(),
            signal_history: VecDeque::new(),
            daily_returns: VecDeque::new(),
            trade_stats: TradeStats::default(),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn record_portfolio_value(&mut self, value: f64, timestamp: DateTime<Utc>) {
        if let Some(prev) = self.portfolio_values.back().map(|p| p.value) {
            let ret = if prev == 0.0 { 0.0 } else { (value - prev) / prev };
            push_bounded(
                &mut self.daily_returns,
                ReturnPoint {
                    timestamp,
                    value: ret,
                },
                self.max_history,
            );
        }
        push_bounded(
            &mut self.portfolio_values,
            ValuePoint { timestamp, value },
            self.max_history,
        );
    }

    pub fn record_trade(
        &mut self,
        symbol: &str,
        action: OrderSide,
        quantity: i64,
        price: f64,
        pnl: f64,
        timestamp: DateTime<Utc>,
    ) {
        push_bounded(
            &mut self.trade_history,
            TradeRecord {
                timestamp,
                symbol: symbol.to_string(),
                action,
                quantity,
                price,
                pnl,
                value: quantity as f64 * price,
            },
            self.max_history,
        );

        let stats = &mut self.trade_stats;
        stats.total_trades += 1;
        stats.total_pnl += pnl;
        if pnl > 0.0 {
            stats.winning_trades += 1;
            stats.max_win = stats.max_win.max(pnl);
        } else if pnl < 0.0 {
            stats.losing_trades += 1;
            stats.max_loss = stats.max_loss.min(pnl);
        }
    }

    pub fn record_signal(&mut self, signal: &Signal, strategy: &str) {
        push_bounded(
            &mut self.signal_history,
            SignalRecord {
                timestamp: signal.timestamp(),
                symbol: signal.symbol().to_string(),
                action: signal.action(),
                quantity: signal.quantity(),
                confidence: signal.confidence(),
                strategy: strategy.to_string(),
                metadata: signal.metadata().clone(),
            },
            self.max_history,
        );
    }

    /// Annualised Sharpe ratio over the most recent `window_days` returns.
    ///
    /// `None` when fewer than `window_days` returns exist or the window is 0.
    pub fn calculate_sharpe_ratio(&self, window_days: usize) -> Option<f64> {
        if window_days == 0 || self.daily_returns.len() < window_days {
            return None;
        }
        let skip = self.daily_returns.len() - window_days;
        let returns: Vec<f64> = self.daily_returns.iter().skip(skip).map(|r| r.value).collect();
        Some(sharpe(&returns))
    }

    /// Performance over the trailing `days` ending at `as_of`.
    ///
    /// `None` when no portfolio value falls inside the window.
    pub fn get_performance_metrics(
        &self,
        days: i64,
        as_of: DateTime<Utc>,
    ) -> Option<PerformanceMetrics> {
        let cutoff = as_of - Duration::days(days);

        let values: Vec<f64> = self
            .portfolio_values
            .iter()
            .filter(|v| v.timestamp >= cutoff)
            .map(|v| v.value)
            .collect();
        let (&start_value, &end_value) = (values.first()?, values.last()?);

        let trades: Vec<&TradeRecord> = self
            .trade_history
            .iter()
            .filter(|t| t.timestamp >= cutoff)
            .collect();
        let returns: Vec<f64> = self
            .daily_returns
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .map(|r| r.value)
            .collect();

        let total_return = if start_value > 0.0 {
            (end_value - start_value) / start_value
        } else {
            0.0
        };

        let trade_count = trades.len();
        let winning_trades = trades.iter().filter(|t| t.pnl > 0.0).count();
        let win_rate = if trade_count > 0 {
            winning_trades as f64 / trade_count as f64
        } else {
            0.0
        };

        let (avg_daily_return, volatility) = if returns.is_empty() {
            (0.0, 0.0)
        } else {
            let n = returns.len() as f64;
            let mean = returns.iter().sum::<f64>() / n;
            let vol = if returns.len() > 1 {
                (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt()
            } else {
                0.0
            };
            (mean, vol)
        };

        let sharpe_window = usize::try_from(days).unwrap_or(0).min(returns.len());

        Some(PerformanceMetrics {
            period_days: days,
            total_return,
            total_return_pct: total_return * 100.0,
            avg_daily_return,
            volatility,
            sharpe_ratio: self.calculate_sharpe_ratio(sharpe_window),
            trade_count,
            win_rate,
            winning_trades,
            losing_trades: trade_count - winning_trades,
            start_value,
            end_value,
        })
    }

    pub fn trade_summary(&self) -> TradeSummary {
        let s = &self.trade_stats;
        let (win_rate, avg_pnl_per_trade) = if s.total_trades > 0 {
            (
                s.winning_trades as f64 / s.total_trades as f64,
                s.total_pnl / s.total_trades as f64,
            )
        } else {
            (0.0, 0.0)
        };
        let profit_factor = if s.max_loss < 0.0 {
            (s.max_win / s.max_loss).abs()
        } else {
            0.0
        };

        TradeSummary {
            total_trades: s.total_trades,
            winning_trades: s.winning_trades,
            losing_trades: s.losing_trades,
            win_rate,
            total_pnl: s.total_pnl,
            avg_pnl_per_trade,
            max_win: s.max_win,
            max_loss: s.max_loss,
            profit_factor,
        }
    }

    pub fn summary(&self, as_of: DateTime<Utc>) -> MetricsSummary {
        MetricsSummary {
            performance_7d: self.get_performance_metrics(7, as_of),
            performance_30d: self.get_performance_metrics(30, as_of),
            trade_summary: self.trade_summary(),
            current_sharpe: self.calculate_sharpe_ratio(DEFAULT_SHARPE_WINDOW),
            data_points: DataPoints {
                portfolio_values: self.portfolio_values.len(),
                trades: self.trade_history.len(),
                signals: self.signal_history.len(),
            },
        }
    }

    pub fn export(&self) -> MetricsExport {
        MetricsExport {
            portfolio_values: self.portfolio_values.iter().cloned().collect(),
            trade_history: self.trade_history.iter().cloned().collect(),
            signal_history: self.signal_history.iter().cloned().collect(),
            daily_returns: self.daily_returns.iter().cloned().collect(),
            trade_stats: self.trade_stats.clone(),
            export_timestamp: Utc::now(),
        }
    }

    pub fn portfolio_values(&self) -> &VecDeque<ValuePoint> {
        &self.portfolio_values
    }

    pub fn daily_returns(&self) -> &VecDeque<ReturnPoint> {
        &self.daily_returns
    }

    pub fn trade_history(&self) -> &VecDeque<TradeRecord> {
        &self.trade_history
    }

    pub fn signal_history(&self) -> &VecDeque<SignalRecord> {
        &self.signal_history
    }

    pub fn trade_stats(&self) -> &TradeStats {
        &self.trade_stats
    }
}

/// mean·252 / (sample stdev·√252); 0 for a single sample or zero deviation.
fn sharpe(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let stddev = if returns.len() > 1 {
        (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };

    if stddev > 0.0 {
        (mean * TRADING_DAYS_PER_YEAR) / (stddev * TRADING_DAYS_PER_YEAR.sqrt())
    } else {
        0.0
    }
}
