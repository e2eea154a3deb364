//! Market data port trait.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use tracing::warn;

use crate::domain::error::ScizorError;
use crate::domain::ohlcv::{Interval, OhlcvBar};

/// Symbol → ascending bar series.
pub type MarketData = HashMap<String, Vec<OhlcvBar>>;

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Date range and fan-out used by `get_latest_data` implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub lookback_days: i64,
    pub batch_size: usize,
    /// End of the window; today (UTC) when unset.
    pub as_of: Option<NaiveDate>,
}

impl Default for FetchWindow {
    fn default() -> Self {
        FetchWindow {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            batch_size: DEFAULT_BATCH_SIZE,
            as_of: None,
        }
    }
}

impl FetchWindow {
    pub fn range(&self) -> (NaiveDate, NaiveDate) {
        let end = self.as_of.unwrap_or_else(|| Utc::now().date_naive());
        (end - Duration::days(self.lookback_days.max(0)), end)
    }
}

#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn get_historical_data(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<OhlcvBar>, ScizorError>;

    /// Best-effort: symbols that fail or return no bars are omitted.
    async fn get_latest_data(&self, symbols: &[String]) -> MarketData;

    fn get_latest_price(&self, symbol: &str) -> Option<f64>;
}

/// Fetch daily bars for every symbol with at most `batch_size` requests in
/// flight. A failing symbol is logged and left out of the result; it never
/// aborts the batch.
pub async fn fetch_latest<P>(
    provider: &P,
    symbols: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
    batch_size: usize,
) -> MarketData
where
    P: DataProvider + ?Sized,
{
    let results: Vec<(String, Result<Vec<OhlcvBar>, ScizorError>)> =
        stream::iter(symbols.iter().cloned())
            .map(|symbol| async move {
                let bars = provider
                    .get_historical_data(&symbol, start_date, end_date, Interval::Daily)
                    .await;
                (symbol, bars)
            })
            .buffer_unordered(batch_size.max(1))
            .collect()
            .await;

    let mut data = MarketData::with_capacity(results.len());
    for (symbol, result) in results {
        match result {
            Ok(bars) if !bars.is_empty() => {
                data.insert(symbol, bars);
            }
            Ok(_) => warn!(symbol = %symbol, "no bars returned, omitting symbol"),
            Err(e) => warn!(symbol = %symbol, error = %e, "failed to fetch data, omitting symbol"),
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flaky;

    #[async_trait]
    impl DataProvider for Flaky {
        async fn get_historical_data(
            &self,
            symbol: &str,
            start_date: NaiveDate,
            _end_date: NaiveDate,
            _interval: Interval,
        ) -> Result<Vec<OhlcvBar>, ScizorError> {
            match symbol {
                "BAD" => Err(ScizorError::data("unreachable")),
                "EMPTY" => Ok(vec![]),
                _ => Ok(vec![OhlcvBar {
                    symbol: symbol.to_string(),
                    date: start_date,
                    open: 1.0,
                    high: 1.0,
                    low: 1.0,
                    close: 1.0,
                    volume: 1,
                    adjusted_close: None,
                }]),
            }
        }

        async fn get_latest_data(&self, symbols: &[String]) -> MarketData {
            let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
            fetch_latest(self, symbols, day, day, 2).await
        }

        fn get_latest_price(&self, _symbol: &str) -> Option<f64> {
            None
        }
    }

    #[tokio::test]
    async fn fetch_latest_omits_failures() {
        let symbols: Vec<String> = ["AAPL", "BAD", "EMPTY", "MSFT"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let data = Flaky.get_latest_data(&symbols).await;

        assert_eq!(data.len(), 2);
        assert!(data.contains_key("AAPL"));
        assert!(data.contains_key("MSFT"));
        assert!(!data.contains_key("BAD"));
        assert!(!data.contains_key("EMPTY"));
    }

    #[test]
    fn window_range_ends_at_anchor() {
        let window = FetchWindow {
            as_of: NaiveDate::from_ymd_opt(2024, 3, 31),
            ..Default::default()
        };
        let (start, end) = window.range();
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[tokio::test]
    async fn fetch_latest_with_zero_batch_size_still_runs() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let data = fetch_latest(&Flaky, &["AAPL".to_string()], day, day, 0).await;
        assert_eq!(data.len(), 1);
    }
}
