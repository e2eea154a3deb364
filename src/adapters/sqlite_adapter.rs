//! SQLite-backed market data store and provider.
//!
//! Tables: `symbols` (universe), `stock_data` (daily bars, unique on
//! symbol+date) and `data_update_log` (collection audit trail).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use tracing::debug;

use crate::domain::error::ScizorError;
use crate::domain::ohlcv::{Interval, OhlcvBar};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{DataProvider, FetchWindow, MarketData, fetch_latest};

const DATE_FORMAT: &str = "%Y-%m-%d";

type Conn = PooledConnection<SqliteConnectionManager>;

fn pool_error(e: r2d2::Error) -> ScizorError {
    ScizorError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> ScizorError {
    ScizorError::DatabaseQuery {
        reason: e.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub exchange: Option<String>,
    pub currency: String,
    pub is_active: bool,
}

impl SymbolInfo {
    pub fn new(symbol: &str) -> Self {
        SymbolInfo {
            symbol: symbol.to_string(),
            name: None,
            sector: None,
            exchange: None,
            currency: "USD".to_string(),
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Pending => "pending",
            UpdateStatus::Running => "running",
            UpdateStatus::Completed => "completed",
            UpdateStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateLogEntry {
    pub symbol: String,
    /// `historical`, `realtime` or `backfill`.
    pub update_type: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: UpdateStatus,
    pub records_processed: usize,
    pub records_inserted: usize,
    pub records_updated: usize,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreOutcome {
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Clone)]
pub struct SqliteDataProvider {
    pool: Pool<SqliteConnectionManager>,
    window: FetchWindow,
}

impl SqliteDataProvider {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ScizorError> {
        let db_path = config
            .get_string("data", "path")
            .ok_or_else(|| ScizorError::ConfigMissing {
                section: "data".into(),
                key: "path".into(),
            })?;
        let pool_size = config.get_int("data", "pool_size", 4).clamp(1, 64) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self {
            pool,
            window: FetchWindow::default(),
        })
    }

    pub fn in_memory() -> Result<Self, ScizorError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self {
            pool,
            window: FetchWindow::default(),
        })
    }

    pub fn with_window(mut self, window: FetchWindow) -> Self {
        self.window = window;
        self
    }

    fn conn(&self) -> Result<Conn, ScizorError> {
        self.pool.get().map_err(pool_error)
    }

    pub fn initialize_schema(&self) -> Result<(), ScizorError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS symbols (
                    symbol TEXT PRIMARY KEY,
                    name TEXT,
                    sector TEXT,
                    exchange TEXT,
                    currency TEXT NOT NULL DEFAULT 'USD',
                    is_active INTEGER NOT NULL DEFAULT 1,
                    last_updated TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS stock_data (
                    symbol TEXT NOT NULL,
                    date TEXT NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    volume INTEGER NOT NULL,
                    adjusted_close REAL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (symbol, date)
                );
                CREATE INDEX IF NOT EXISTS idx_stock_data_date ON stock_data(date);
                CREATE TABLE IF NOT EXISTS data_update_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    symbol TEXT NOT NULL,
                    update_type TEXT NOT NULL,
                    start_date TEXT,
                    end_date TEXT,
                    status TEXT NOT NULL,
                    records_processed INTEGER NOT NULL DEFAULT 0,
                    records_inserted INTEGER NOT NULL DEFAULT 0,
                    records_updated INTEGER NOT NULL DEFAULT 0,
                    error_message TEXT,
                    started_at TEXT NOT NULL,
                    completed_at TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_update_log_symbol ON data_update_log(symbol);",
            )
            .map_err(query_error)
    }

    pub fn upsert_symbol(&self, info: &SymbolInfo) -> Result<(), ScizorError> {
        self.conn()?
            .execute(
                "INSERT INTO symbols (symbol, name, sector, exchange, currency, is_active, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(symbol) DO UPDATE SET
                    name = excluded.name,
                    sector = excluded.sector,
                    exchange = excluded.exchange,
                    currency = excluded.currency,
                    is_active = excluded.is_active,
                    last_updated = excluded.last_updated",
                params![
                    info.symbol,
                    info.name,
                    info.sector,
                    info.exchange,
                    info.currency,
                    info.is_active,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(query_error)?;
        Ok(())
    }

    pub fn active_symbols(&self) -> Result<Vec<String>, ScizorError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT symbol FROM symbols WHERE is_active = 1 ORDER BY symbol")
            .map_err(query_error)?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(query_error)?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row.map_err(query_error)?);
        }
        Ok(symbols)
    }

    /// Insert new bars and overwrite existing (symbol, date) rows in one transaction.
    pub fn store_bars(&self, bars: &[OhlcvBar]) -> Result<StoreOutcome, ScizorError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        let now = Utc::now().to_rfc3339();
        let mut outcome = StoreOutcome::default();

        for bar in bars {
            let date = bar.date.format(DATE_FORMAT).to_string();
            let exists = tx
                .query_row(
                    "SELECT 1 FROM stock_data WHERE symbol = ?1 AND date = ?2",
                    params![bar.symbol, date],
                    |_| Ok(()),
                )
                .optional()
                .map_err(query_error)?
                .is_some();

            if exists {
                tx.execute(
                    "UPDATE stock_data
                     SET open = ?3, high = ?4, low = ?5, close = ?6, volume = ?7,
                         adjusted_close = ?8, updated_at = ?9
                     WHERE symbol = ?1 AND date = ?2",
                    params![
                        bar.symbol,
                        date,
                        bar.open,
                        bar.high,
                        bar.low,
                        bar.close,
                        bar.volume,
                        bar.adjusted_close,
                        now
                    ],
                )
                .map_err(query_error)?;
                outcome.updated += 1;
            } else {
                tx.execute(
                    "INSERT INTO stock_data
                        (symbol, date, open, high, low, close, volume, adjusted_close, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                    params![
                        bar.symbol,
                        date,
                        bar.open,
                        bar.high,
                        bar.low,
                        bar.close,
                        bar.volume,
                        bar.adjusted_close,
                        now
                    ],
                )
                .map_err(query_error)?;
                outcome.inserted += 1;
            }
        }

        tx.commit().map_err(query_error)?;
        debug!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            "stored bars"
        );
        Ok(outcome)
    }

    pub fn log_update(&self, entry: &UpdateLogEntry) -> Result<(), ScizorError> {
        let fmt_date = |d: Option<NaiveDate>| d.map(|d| d.format(DATE_FORMAT).to_string());
        self.conn()?
            .execute(
                "INSERT INTO data_update_log
                    (symbol, update_type, start_date, end_date, status, records_processed,
                     records_inserted, records_updated, error_message, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    entry.symbol,
                    entry.update_type,
                    fmt_date(entry.start_date),
                    fmt_date(entry.end_date),
                    entry.status.as_str(),
                    entry.records_processed as i64,
                    entry.records_inserted as i64,
                    entry.records_updated as i64,
                    entry.error_message,
                    entry.started_at.to_rfc3339(),
                    entry.completed_at.map(|t| t.to_rfc3339())
                ],
            )
            .map_err(query_error)?;
        Ok(())
    }

    /// `(status, records_processed)` of logged updates for `symbol`, oldest first.
    pub fn update_history(&self, symbol: &str) -> Result<Vec<(String, i64)>, ScizorError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT status, records_processed FROM data_update_log
                 WHERE symbol = ?1 ORDER BY id ASC",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![symbol], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(query_error)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(query_error)?);
        }
        Ok(entries)
    }

    fn query_bars(
        conn: &Conn,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, ScizorError> {
        let mut stmt = conn
            .prepare(
                "SELECT symbol, date, open, high, low, close, volume, adjusted_close
                 FROM stock_data
                 WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(
                params![
                    symbol,
                    start_date.format(DATE_FORMAT).to_string(),
                    end_date.format(DATE_FORMAT).to_string()
                ],
                |row| {
                    let date_str: String = row.get(1)?;
                    let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    Ok(OhlcvBar {
                        symbol: row.get(0)?,
                        date,
                        open: row.get(2)?,
                        high: row.get(3)?,
                        low: row.get(4)?,
                        close: row.get(5)?,
                        volume: row.get(6)?,
                        adjusted_close: row.get(7)?,
                    })
                },
            )
            .map_err(query_error)?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row.map_err(query_error)?);
        }
        Ok(bars)
    }
}

#[async_trait]
impl DataProvider for SqliteDataProvider {
    async fn get_historical_data(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<OhlcvBar>, ScizorError> {
        let pool = self.pool.clone();
        let owned_symbol = symbol.to_string();
        let bars = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(pool_error)?;
            SqliteDataProvider::query_bars(&conn, &owned_symbol, start_date, end_date)
        })
        .await
        .map_err(|e| ScizorError::Database {
            reason: format!("query task failed: {e}"),
        })??;

        if bars.is_empty() {
            return Err(ScizorError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(interval.apply(bars))
    }

    async fn get_latest_data(&self, symbols: &[String]) -> MarketData {
        let (start, end) = self.window.range();
        fetch_latest(self, symbols, start, end, self.window.batch_size).await
    }

    fn get_latest_price(&self, symbol: &str) -> Option<f64> {
        let conn = self.conn().ok()?;
        conn.query_row(
            "SELECT close FROM stock_data WHERE symbol = ?1 ORDER BY date DESC LIMIT 1",
            params![symbol],
            |row| row.get(0),
        )
        .optional()
        .ok()
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn bar(symbol: &str, day: u32, close: f64) -> OhlcvBar {
        OhlcvBar {
            symbol: symbol.to_string(),
            date: date(day),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000,
            adjusted_close: Some(close),
        }
    }

    fn provider() -> SqliteDataProvider {
        let p = SqliteDataProvider::in_memory().unwrap();
        p.initialize_schema().unwrap();
        p
    }

    #[test]
    fn schema_is_idempotent() {
        let p = provider();
        assert!(p.initialize_schema().is_ok());
    }

    #[test]
    fn store_bars_counts_inserts_and_updates() {
        let p = provider();
        let first = p
            .store_bars(&[bar("AAPL", 2, 150.0), bar("AAPL", 3, 151.0)])
            .unwrap();
        assert_eq!(first, StoreOutcome { inserted: 2, updated: 0 });

        let second = p
            .store_bars(&[bar("AAPL", 3, 152.0), bar("AAPL", 4, 153.0)])
            .unwrap();
        assert_eq!(second, StoreOutcome { inserted: 1, updated: 1 });
        assert_eq!(p.get_latest_price("AAPL"), Some(153.0));
    }

    #[tokio::test]
    async fn historical_data_in_range() {
        let p = provider();
        p.store_bars(&[bar("AAPL", 4, 3.0), bar("AAPL", 2, 1.0), bar("AAPL", 3, 2.0)])
            .unwrap();

        let bars = p
            .get_historical_data("AAPL", date(2), date(3), Interval::Daily)
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, date(2));
        assert_eq!(bars[1].close, 2.0);
        assert_eq!(bars[1].adjusted_close, Some(2.0));
    }

    #[tokio::test]
    async fn empty_range_is_no_data() {
        let p = provider();
        let err = p
            .get_historical_data("MSFT", date(1), date(31), Interval::Daily)
            .await
            .unwrap_err();
        assert!(matches!(err, ScizorError::NoData { .. }));
        assert_eq!(p.get_latest_price("MSFT"), None);
    }

    #[tokio::test]
    async fn latest_data_uses_window() {
        let p = provider().with_window(FetchWindow {
            lookback_days: 5,
            batch_size: 2,
            as_of: Some(date(10)),
        });
        p.store_bars(&[bar("AAPL", 1, 1.0), bar("AAPL", 6, 2.0), bar("AAPL", 10, 3.0)])
            .unwrap();

        let data = p
            .get_latest_data(&["AAPL".to_string(), "MSFT".to_string()])
            .await;
        assert_eq!(data.len(), 1);
        assert_eq!(data["AAPL"].len(), 2);
    }

    #[test]
    fn symbols_upsert_and_active_filter() {
        let p = provider();
        p.upsert_symbol(&SymbolInfo::new("MSFT")).unwrap();
        p.upsert_symbol(&SymbolInfo::new("AAPL")).unwrap();
        p.upsert_symbol(&SymbolInfo {
            is_active: false,
            ..SymbolInfo::new("GME")
        })
        .unwrap();
        p.upsert_symbol(&SymbolInfo {
            name: Some("Microsoft".into()),
            ..SymbolInfo::new("MSFT")
        })
        .unwrap();

        assert_eq!(p.active_symbols().unwrap(), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn update_log_records_entries() {
        let p = provider();
        let entry = UpdateLogEntry {
            symbol: "AAPL".into(),
            update_type: "historical".into(),
            start_date: Some(date(1)),
            end_date: Some(date(31)),
            status: UpdateStatus::Completed,
            records_processed: 21,
            records_inserted: 20,
            records_updated: 1,
            error_message: None,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
        };
        p.log_update(&entry).unwrap();
        p.log_update(&UpdateLogEntry {
            status: UpdateStatus::Failed,
            records_processed: 0,
            error_message: Some("timeout".into()),
            ..entry.clone()
        })
        .unwrap();

        assert_eq!(
            p.update_history("AAPL").unwrap(),
            vec![("completed".to_string(), 21), ("failed".to_string(), 0)]
        );
    }
}
