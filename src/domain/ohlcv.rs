//! OHLCV bar representation.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub adjusted_close: Option<f64>,
}

/// Bar interval requested from a data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interval {
    #[default]
    Daily,
    Weekly,
}

impl Interval {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1d" | "d" | "daily" => Some(Interval::Daily),
            "1w" | "1wk" | "w" | "weekly" => Some(Interval::Weekly),
            _ => None,
        }
    }

    /// Convert daily bars (ascending by date) to this interval.
    pub fn apply(self, bars: Vec<OhlcvBar>) -> Vec<OhlcvBar> {
        match self {
            Interval::Daily => bars,
            Interval::Weekly => resample_weekly(&bars),
        }
    }
}

impl OhlcvBar {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Aggregate ascending daily bars into ISO-week bars dated on the last trading day of the week.
pub fn resample_weekly(bars: &[OhlcvBar]) -> Vec<OhlcvBar> {
    let mut out: Vec<OhlcvBar> = Vec::new();
    let mut current_week: Option<(i32, u32)> = None;

    for bar in bars {
        let iso = bar.date.iso_week();
        let week = (iso.year(), iso.week());
        match (current_week, out.last_mut()) {
            (Some(w), Some(agg)) if w == week => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
                agg.adjusted_close = bar.adjusted_close;
                agg.date = bar.date;
            }
            _ => {
                out.push(bar.clone());
                current_week = Some(week);
            }
        }
    }

    out
}

/// Closing price of the most recent bar, if any.
pub fn last_close(bars: &[OhlcvBar]) -> Option<f64> {
    bars.last().map(|b| b.close)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> OhlcvBar {
        OhlcvBar {
            symbol: "AAPL".into(),
            date,
            open,
            high,
            low,
            close,
            volume: 1_000,
            adjusted_close: None,
        }
    }

    #[test]
    fn typical_price() {
        let b = bar(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), 100.0, 110.0, 90.0, 105.0);
        let expected = (110.0 + 90.0 + 105.0) / 3.0;
        assert!((b.typical_price() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn interval_parse() {
        assert_eq!(Interval::parse("1d"), Some(Interval::Daily));
        assert_eq!(Interval::parse("Weekly"), Some(Interval::Weekly));
        assert_eq!(Interval::parse("5m"), None);
    }

    #[test]
    fn resample_weekly_merges_iso_weeks() {
        // 2024-01-15 is a Monday; 2024-01-22 starts the next week.
        let bars = vec![
            bar(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), 10.0, 12.0, 9.0, 11.0),
            bar(NaiveDate::from_ymd_opt(2024, 1, 16).unwrap(), 11.0, 15.0, 10.0, 14.0),
            bar(NaiveDate::from_ymd_opt(2024, 1, 19).unwrap(), 14.0, 14.5, 8.0, 13.0),
            bar(NaiveDate::from_ymd_opt(2024, 1, 22).unwrap(), 13.0, 13.5, 12.0, 12.5),
        ];

        let weekly = resample_weekly(&bars);
        assert_eq!(weekly.len(), 2);

        let first = &weekly[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 19).unwrap());
        assert_eq!(first.open, 10.0);
        assert_eq!(first.high, 15.0);
        assert_eq!(first.low, 8.0);
        assert_eq!(first.close, 13.0);
        assert_eq!(first.volume, 3_000);

        assert_eq!(weekly[1].close, 12.5);
    }

    #[test]
    fn last_close_of_empty_series() {
        assert_eq!(last_close(&[]), None);
    }
}
