//! CSV file data provider. One `<SYMBOL>.csv` per symbol with columns
//! `date,open,high,low,close,volume[,adjusted_close]`.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::error::ScizorError;
use crate::domain::ohlcv::{Interval, OhlcvBar, last_close};
use crate::ports::data_port::{DataProvider, FetchWindow, MarketData, fetch_latest};

pub struct CsvDataProvider {
    base_path: PathBuf,
    window: FetchWindow,
}

impl CsvDataProvider {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            window: FetchWindow::default(),
        }
    }

    pub fn with_window(mut self, window: FetchWindow) -> Self {
        self.window = window;
        self
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    /// Symbols with a CSV file in the base directory, sorted.
    pub fn available_symbols(&self) -> Result<Vec<String>, ScizorError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            ScizorError::data(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| ScizorError::data(format!("directory entry error: {e}")))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    symbols.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}

fn field<'a>(record: &'a csv::StringRecord, index: usize, name: &str) -> Result<&'a str, ScizorError> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| ScizorError::data(format!("missing {name} column")))
}

fn number<T: std::str::FromStr>(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
) -> Result<T, ScizorError>
where
    T::Err: std::fmt::Display,
{
    field(record, index, name)?
        .parse()
        .map_err(|e| ScizorError::data(format!("invalid {name} value: {e}")))
}

/// Parse CSV content, keeping bars dated within `[start, end]`, ascending.
pub fn parse_bars(
    symbol: &str,
    content: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Vec<OhlcvBar>, ScizorError> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut bars = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| ScizorError::data(format!("CSV parse error: {e}")))?;

        let date = NaiveDate::parse_from_str(field(&record, 0, "date")?, "%Y-%m-%d")
            .map_err(|e| ScizorError::data(format!("invalid date format: {e}")))?;
        if date < start_date || date > end_date {
            continue;
        }

        let adjusted_close = match record.get(6).map(str::trim) {
            Some(v) if !v.is_empty() => Some(number(&record, 6, "adjusted_close")?),
            _ => None,
        };

        bars.push(OhlcvBar {
            symbol: symbol.to_string(),
            date,
            open: number(&record, 1, "open")?,
            high: number(&record, 2, "high")?,
            low: number(&record, 3, "low")?,
            close: number(&record, 4, "close")?,
            volume: number(&record, 5, "volume")?,
            adjusted_close,
        });
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

fn read_error(symbol: &str, path: &Path, e: std::io::Error) -> ScizorError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ScizorError::NoData {
            symbol: symbol.to_string(),
        }
    } else {
        ScizorError::data(format!("failed to read {}: {}", path.display(), e))
    }
}

#[async_trait]
impl DataProvider for CsvDataProvider {
    async fn get_historical_data(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<OhlcvBar>, ScizorError> {
        let path = self.csv_path(symbol);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| read_error(symbol, &path, e))?;
        let bars = parse_bars(symbol, &content, start_date, end_date)?;
        Ok(interval.apply(bars))
    }

    async fn get_latest_data(&self, symbols: &[String]) -> MarketData {
        let (start, end) = self.window.range();
        fetch_latest(self, symbols, start, end, self.window.batch_size).await
    }

    /// Close of the last row on or before the window end.
    fn get_latest_price(&self, symbol: &str) -> Option<f64> {
        let content = fs::read_to_string(self.csv_path(symbol)).ok()?;
        let (_, end) = self.window.range();
        let bars = parse_bars(symbol, &content, NaiveDate::MIN, end).ok()?;
        last_close(&bars)
    }
}
