//! Simple Moving Average over closing prices.
//!
//! SMA(n)[i] = sum(C[i-j] for j in 0..n) / n
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_sma(bars: &[OhlcvBar], period: usize, name: &str) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());
    let warmup = period.saturating_sub(1);
    let mut window_sum = 0.0_f64;

    for i in 0..bars.len() {
        window_sum += bars[i].close;
        if period > 0 && i >= period {
            window_sum -= bars[i - period].close;
        }

        let valid = period > 0 && i >= warmup;
        let value = if valid {
            window_sum / period as f64
        } else {
            0.0
        };

        values.push(IndicatorPoint {
            date: bars[i].date,
            valid,
            value,
        });
    }

    IndicatorSeries::new(name, values)
}
