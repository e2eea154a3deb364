//! Synthetic market data: a deterministic random walk per symbol.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::error::ScizorError;
use crate::domain::ohlcv::{Interval, OhlcvBar, last_close};
use crate::ports::data_port::{DataProvider, FetchWindow, MarketData, fetch_latest};

pub const DEFAULT_MOCK_PRICE: f64 = 100.0;

const DAILY_DRIFT: f64 = 0.001;
const DAILY_VOLATILITY: f64 = 0.02;

pub struct MockDataProvider {
    seed: u64,
    window: FetchWindow,
    base_prices: HashMap<String, f64>,
    last_closes: Mutex<HashMap<String, f64>>,
}

impl MockDataProvider {
    pub fn new(seed: u64) -> Self {
        let base_prices = [
            ("AAPL", 150.0),
            ("GOOGL", 2500.0),
            ("MSFT", 300.0),
            ("TSLA", 800.0),
        ]
        .into_iter()
        .map(|(s, p)| (s.to_string(), p))
        .collect();

        MockDataProvider {
            seed,
            window: FetchWindow::default(),
            base_prices,
            last_closes: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_window(mut self, window: FetchWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_base_price(mut self, symbol: &str, price: f64) -> Self {
        self.base_prices.insert(symbol.to_string(), price);
        self
    }

    pub fn base_price(&self, symbol: &str) -> f64 {
        self.base_prices
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_MOCK_PRICE)
    }

    fn symbol_seed(&self, symbol: &str) -> u64 {
        symbol.bytes().fold(self.seed, |acc, b| {
            acc.wrapping_mul(31).wrapping_add(u64::from(b))
        })
    }

    /// One bar per calendar day in `[start, end]`, walking from the base price.
    pub fn generate(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, ScizorError> {
        let returns = Normal::new(DAILY_DRIFT, DAILY_VOLATILITY)
            .map_err(|e| ScizorError::data(format!("invalid return distribution: {e}")))?;
        let mut rng = StdRng::seed_from_u64(self.symbol_seed(symbol));
        let days = (end - start).num_days();
        let mut bars = Vec::with_capacity(usize::try_from(days + 1).unwrap_or(0));
        let mut close = self.base_price(symbol);

        for i in 0..=days {
            if i > 0 {
                close *= 1.0 + returns.sample(&mut rng);
            }
            bars.push(OhlcvBar {
                symbol: symbol.to_string(),
                date: start + Duration::days(i),
                open: close * rng.gen_range(0.98..1.02),
                high: close * rng.gen_range(1.00..1.05),
                low: close * rng.gen_range(0.95..1.00),
                close,
                volume: rng.gen_range(1_000_000..10_000_000),
                adjusted_close: Some(close),
            });
        }
        Ok(bars)
    }

    fn remember(&self, symbol: &str, bars: &[OhlcvBar]) {
        if let (Some(close), Ok(mut cache)) = (last_close(bars), self.last_closes.lock()) {
            cache.insert(symbol.to_string(), close);
        }
    }
}

#[async_trait]
impl DataProvider for MockDataProvider {
    async fn get_historical_data(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<OhlcvBar>, ScizorError> {
        if start_date > end_date {
            return Err(ScizorError::data(format!(
                "start date {start_date} is after end date {end_date}"
            )));
        }
        let bars = self.generate(symbol, start_date, end_date)?;
        self.remember(symbol, &bars);
        Ok(interval.apply(bars))
    }

    async fn get_latest_data(&self, symbols: &[String]) -> MarketData {
        let (start, end) = self.window.range();
        fetch_latest(self, symbols, start, end, self.window.batch_size).await
    }

    /// Last close of the most recent series generated for `symbol`, else its
    /// base price.
    fn get_latest_price(&self, symbol: &str) -> Option<f64> {
        let cached = self
            .last_closes
            .lock()
            .ok()
            .and_then(|cache| cache.get(symbol).copied());
        Some(cached.unwrap_or_else(|| self.base_price(symbol)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn generates_one_bar_per_day() {
        let provider = MockDataProvider::new(42);
        let bars = provider
            .get_historical_data("AAPL", date(2024, 1, 1), date(2024, 1, 31), Interval::Daily)
            .await
            .unwrap();

        assert_eq!(bars.len(), 31);
        assert_eq!(bars[0].close, 150.0);
        assert!(bars.windows(2).all(|w| w[0].date < w[1].date));
        assert!(bars.iter().all(|b| b.high >= b.close && b.low <= b.close));
    }

    #[test]
    fn same_seed_same_series() {
        let series = |seed| {
            MockDataProvider::new(seed)
                .generate("MSFT", date(2024, 1, 1), date(2024, 2, 1))
                .unwrap()
        };
        let (a, b, c) = (series(7), series(7), series(8));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn daily_returns_are_roughly_two_percent() {
        let bars = MockDataProvider::new(11)
            .generate("AAPL", date(2020, 1, 1), date(2025, 12, 31))
            .unwrap();
        let returns: Vec<f64> = bars.windows(2).map(|w| w[1].close / w[0].close - 1.0).collect();
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let stddev = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();

        assert!(mean.abs() < 0.005, "mean {mean}");
        assert!((0.017..0.023).contains(&stddev), "stddev {stddev}");
    }

    #[tokio::test]
    async fn latest_price_follows_generated_series() {
        let provider = MockDataProvider::new(42);
        assert_eq!(provider.get_latest_price("TSLA"), Some(800.0));
        assert_eq!(provider.get_latest_price("ZZZ"), Some(DEFAULT_MOCK_PRICE));

        let bars = provider
            .get_historical_data("TSLA", date(2024, 1, 1), date(2024, 1, 10), Interval::Daily)
            .await
            .unwrap();
        assert_eq!(provider.get_latest_price("TSLA"), last_close(&bars));
    }

    #[tokio::test]
    async fn latest_data_uses_window() {
        let provider = MockDataProvider::new(1).with_window(FetchWindow {
            lookback_days: 9,
            batch_size: 2,
            as_of: Some(date(2024, 6, 30)),
        });
        let data = provider
            .get_latest_data(&["AAPL".to_string(), "GOOGL".to_string()])
            .await;

        assert_eq!(data.len(), 2);
        assert_eq!(data["AAPL"].len(), 10);
        assert_eq!(data["GOOGL"][0].close, 2500.0);
        assert_eq!(data["GOOGL"].last().unwrap().date, date(2024, 6, 30));
    }

    #[tokio::test]
    async fn inverted_range_is_an_error() {
        let provider = MockDataProvider::new(1);
        let err = provider
            .get_historical_data("AAPL", date(2024, 2, 1), date(2024, 1, 1), Interval::Daily)
            .await
            .unwrap_err();
        assert!(matches!(err, ScizorError::Data { .. }));
    }

    #[tokio::test]
    async fn weekly_interval_resamples() {
        let provider = MockDataProvider::new(3);
        // Monday 2024-01-01 through Sunday 2024-01-14: two ISO weeks
        let bars = provider
            .get_historical_data("AAPL", date(2024, 1, 1), date(2024, 1, 14), Interval::Weekly)
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
    }
}
