//! Technical indicator series.
//!
//! - `IndicatorPoint`: a single point in an indicator time series
//! - `IndicatorSeries`: a named series aligned with the input bars
//! - `Indicators`: indicator name → series, as returned by strategies

pub mod sma;

use chrono::NaiveDate;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub name: String,
    pub values: Vec<IndicatorPoint>,
}

pub type Indicators = HashMap<String, IndicatorSeries>;

impl IndicatorSeries {
    pub fn new(name: impl Into<String>, values: Vec<IndicatorPoint>) -> Self {
        IndicatorSeries {
            name: name.into(),
            values,
        }
    }

    /// Value at `index` if the point exists and is past warmup.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values
            .get(index)
            .filter(|p| p.valid)
            .map(|p| p.value)
    }

    /// Most recent valid value, only if the last point itself is valid.
    pub fn latest(&self) -> Option<f64> {
        self.values.len().checked_sub(1).and_then(|i| self.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
