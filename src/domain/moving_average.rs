//! Moving-average crossover strategy.
//!
//! Buys when the short SMA crosses above the long SMA and sells the whole
//! holding when it crosses back below.

use chrono::{DateTime, Utc};

use crate::domain::indicator::sma::calculate_sma;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, Indicators};
use crate::domain::ohlcv::{OhlcvBar, last_close};
use crate::domain::signal::{Signal, SignalAction};
use crate::domain::strategy::{DEFAULT_POSITION_FRACTION, Strategy, StrategyContext};
use crate::ports::data_port::MarketData;

pub const STRATEGY_NAME: &str = "MovingAverageCrossover";

pub const SHORT_MA: &str = "short_ma";
pub const LONG_MA: &str = "long_ma";
pub const CROSS_SIGNAL: &str = "signal";
pub const CROSS_POSITIONS: &str = "positions";

#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverageCrossover {
    pub short_window: usize,
    pub long_window: usize,
    pub symbols: Vec<String>,
    pub position_fraction: f64,
}

impl Default for MovingAverageCrossover {
    fn default() -> Self {
        MovingAverageCrossover {
            short_window: 10,
            long_window: 20,
            symbols: vec!["AAPL".to_string()],
            position_fraction: DEFAULT_POSITION_FRACTION,
        }
    }
}

impl MovingAverageCrossover {
    pub fn new(short_window: usize, long_window: usize, symbols: Vec<String>) -> Self {
        MovingAverageCrossover {
            short_window,
            long_window,
            symbols,
            ..Default::default()
        }
    }

    pub fn with_position_fraction(mut self, fraction: f64) -> Self {
        self.position_fraction = fraction;
        self
    }

    /// 0.5 plus ten times the relative gap between the averages, capped at 1.
    fn confidence(short_ma: Option<f64>, long_ma: Option<f64>) -> f64 {
        match (short_ma, long_ma) {
            (Some(s), Some(l)) if l != 0.0 => (0.5 + (s - l).abs() / l * 10.0).min(1.0),
            _ => 0.5,
        }
    }
}

fn latest(indicators: &Indicators, name: &str) -> Option<f64> {
    indicators.get(name).and_then(IndicatorSeries::latest)
}

impl Strategy for MovingAverageCrossover {
    fn name(&self) -> &str {
        STRATEGY_NAME
    }

    fn get_required_symbols(&self) -> Vec<String> {
        self.symbols.clone()
    }

    fn calculate_indicators(&self, bars: &[OhlcvBar]) -> Indicators {
        let short = calculate_sma(bars, self.short_window, SHORT_MA);
        let long = calculate_sma(bars, self.long_window, LONG_MA);

        // A missing average compares as "not above".
        let signal: Vec<IndicatorPoint> = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| {
                let above = matches!((short.get(i), long.get(i)), (Some(s), Some(l)) if s > l);
                IndicatorPoint {
                    date: bar.date,
                    valid: true,
                    value: if above { 1.0 } else { 0.0 },
                }
            })
            .collect();

        let positions: Vec<IndicatorPoint> = signal
            .iter()
            .enumerate()
            .map(|(i, point)| match i.checked_sub(1) {
                Some(prev) => IndicatorPoint {
                    date: point.date,
                    valid: true,
                    value: point.value - signal[prev].value,
                },
                None => IndicatorPoint {
                    date: point.date,
                    valid: false,
                    value: 0.0,
                },
            })
            .collect();

        let mut indicators = Indicators::new();
        indicators.insert(SHORT_MA.to_string(), short);
        indicators.insert(LONG_MA.to_string(), long);
        indicators.insert(
            CROSS_SIGNAL.to_string(),
            IndicatorSeries::new(CROSS_SIGNAL, signal),
        );
        indicators.insert(
            CROSS_POSITIONS.to_string(),
            IndicatorSeries::new(CROSS_POSITIONS, positions),
        );
        indicators
    }

    fn generate_signals(
        &self,
        market_data: &MarketData,
        current_time: DateTime<Utc>,
        ctx: &StrategyContext<'_>,
    ) -> Vec<Signal> {
        let mut signals = Vec::new();

        for symbol in &self.symbols {
            let Some(bars) = market_data.get(symbol) else {
                continue;
            };
            if bars.len() < self.long_window {
                continue;
            }
            let Some(close) = last_close(bars) else {
                continue;
            };

            let indicators = self.calculate_indicators(bars);
            let short_ma = latest(&indicators, SHORT_MA);
            let long_ma = latest(&indicators, LONG_MA);
            let cross = latest(&indicators, CROSS_POSITIONS).unwrap_or(0.0);

            let (action, quantity) = if cross > 0.5 {
                (SignalAction::Buy, self.get_position_size(symbol, 1.0, ctx))
            } else if cross < -0.5 {
                let held = ctx.portfolio.get_position(symbol).map_or(0, |p| p.quantity);
                (SignalAction::Sell, held)
            } else {
                continue;
            };
            if quantity <= 0 {
                continue;
            }

            let mut signal = Signal::new(symbol.as_str(), action, quantity, current_time)
                .with_price(close)
                .with_confidence(Self::confidence(short_ma, long_ma))
                .with_metadata("strategy", STRATEGY_NAME);
            if let Some(s) = short_ma {
                signal = signal.with_metadata(SHORT_MA, s);
            }
            if let Some(l) = long_ma {
                signal = signal.with_metadata(LONG_MA, l);
            }
            signals.push(signal);
        }

        signals
    }

    fn position_fraction(&self) -> f64 {
        self.position_fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::PortfolioManager;
    use crate::domain::risk::RiskSettings;
    use crate::domain::strategy::test_support::QuoteProvider;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn bars(symbol: &str, closes: &[f64]) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                symbol: symbol.to_string(),
                date: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000,
                adjusted_close: None,
            })
            .collect()
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 16, 0, 0).unwrap()
    }

    fn strategy() -> MovingAverageCrossover {
        MovingAverageCrossover::new(2, 4, vec!["AAPL".into()])
    }

    // flat then a jump on the last bar: short crosses above long at the end
    const CROSS_UP: [f64; 5] = [10.0, 10.0, 10.0, 10.0, 20.0];
    // rising then a drop on the last bar: short crosses below long at the end
    const CROSS_DOWN: [f64; 6] = [10.0, 10.0, 10.0, 10.0, 14.0, 4.0];

    #[test]
    fn indicators_have_expected_shape() {
        let ind = strategy().calculate_indicators(&bars("AAPL", &CROSS_UP));

        assert_eq!(ind[SHORT_MA].get(0), None);
        assert_eq!(ind[SHORT_MA].get(1), Some(10.0));
        assert_eq!(ind[LONG_MA].get(2), None);
        assert_eq!(ind[LONG_MA].get(3), Some(10.0));
        assert_eq!(ind[CROSS_SIGNAL].get(3), Some(0.0));
        assert_eq!(ind[CROSS_SIGNAL].get(4), Some(1.0));
        assert_eq!(ind[CROSS_POSITIONS].get(0), None);
        assert_eq!(ind[CROSS_POSITIONS].get(4), Some(1.0));
    }

    #[test]
    fn buy_on_upward_cross() {
        let pm = PortfolioManager::new(100_000.0, RiskSettings::default());
        let data = QuoteProvider::default().with_price("AAPL", 20.0);
        let ctx = StrategyContext::new(&pm, &data);
        let market = MarketData::from([("AAPL".to_string(), bars("AAPL", &CROSS_UP))]);

        let signals = strategy().generate_signals(&market, ts(), &ctx);
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.action(), SignalAction::Buy);
        // 100_000 * 0.1 / 20
        assert_eq!(s.quantity(), 500);
        assert_eq!(s.price(), Some(20.0));
        assert_eq!(s.timestamp(), ts());
        // short 15, long 12.5: 0.5 + 0.2 * 10 capped
        assert_eq!(s.confidence(), 1.0);
        assert_eq!(s.metadata()["strategy"], STRATEGY_NAME);
        assert_eq!(s.metadata()[SHORT_MA], 15.0);
        assert_eq!(s.metadata()[LONG_MA], 12.5);
    }

    #[test]
    fn no_buy_without_price() {
        let pm = PortfolioManager::new(100_000.0, RiskSettings::default());
        let data = QuoteProvider::default();
        let ctx = StrategyContext::new(&pm, &data);
        let market = MarketData::from([("AAPL".to_string(), bars("AAPL", &CROSS_UP))]);

        assert!(strategy().generate_signals(&market, ts(), &ctx).is_empty());
    }

    #[test]
    fn sell_whole_position_on_downward_cross() {
        let mut pm = PortfolioManager::new(100_000.0, RiskSettings::default());
        assert!(pm.add_position("AAPL", 30, 10.0));
        let data = QuoteProvider::default();
        let ctx = StrategyContext::new(&pm, &data);
        let market = MarketData::from([("AAPL".to_string(), bars("AAPL", &CROSS_DOWN))]);

        let signals = strategy().generate_signals(&market, ts(), &ctx);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action(), SignalAction::Sell);
        assert_eq!(signals[0].quantity(), 30);
        assert_eq!(signals[0].price(), Some(4.0));
    }

    #[test]
    fn no_sell_without_position() {
        let pm = PortfolioManager::new(100_000.0, RiskSettings::default());
        let data = QuoteProvider::default();
        let ctx = StrategyContext::new(&pm, &data);
        let market = MarketData::from([("AAPL".to_string(), bars("AAPL", &CROSS_DOWN))]);

        assert!(strategy().generate_signals(&market, ts(), &ctx).is_empty());
    }

    #[test]
    fn skips_missing_and_short_series() {
        let pm = PortfolioManager::new(100_000.0, RiskSettings::default());
        let data = QuoteProvider::default().with_price("AAPL", 20.0);
        let ctx = StrategyContext::new(&pm, &data);

        let empty = MarketData::new();
        assert!(strategy().generate_signals(&empty, ts(), &ctx).is_empty());

        let short = MarketData::from([("AAPL".to_string(), bars("AAPL", &[10.0, 20.0, 30.0]))]);
        assert!(strategy().generate_signals(&short, ts(), &ctx).is_empty());
    }

    #[test]
    fn no_signal_without_cross() {
        let pm = PortfolioManager::new(100_000.0, RiskSettings::default());
        let data = QuoteProvider::default().with_price("AAPL", 10.0);
        let ctx = StrategyContext::new(&pm, &data);
        let market = MarketData::from([("AAPL".to_string(), bars("AAPL", &[10.0; 8]))]);

        assert!(strategy().generate_signals(&market, ts(), &ctx).is_empty());
    }

    #[test]
    fn confidence_scales_with_gap() {
        assert_eq!(MovingAverageCrossover::confidence(None, Some(1.0)), 0.5);
        assert!((MovingAverageCrossover::confidence(Some(101.0), Some(100.0)) - 0.6).abs() < 1e-9);
        assert_eq!(MovingAverageCrossover::confidence(Some(200.0), Some(100.0)), 1.0);
    }

    #[test]
    fn defaults() {
        let s = MovingAverageCrossover::default();
        assert_eq!(s.short_window, 10);
        assert_eq!(s.long_window, 20);
        assert_eq!(s.get_required_symbols(), vec!["AAPL".to_string()]);
        assert_eq!(s.name(), STRATEGY_NAME);
        assert_eq!(s.position_fraction(), 0.10);
    }
}
