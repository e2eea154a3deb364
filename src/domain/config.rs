//! Typed, immutable trading configuration built from a [`ConfigPort`].

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::config_validation::validate_trading_config;
use crate::domain::error::ScizorError;
use crate::domain::metrics::DEFAULT_MAX_HISTORY;
use crate::domain::risk::RiskSettings;
use crate::domain::strategy::DEFAULT_POSITION_FRACTION;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DEFAULT_BATCH_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerKind {
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Mock,
    Csv,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    MovingAverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CommissionSettings {
    pub rate: f64,
    pub per_share: bool,
}

impl CommissionSettings {
    /// Commission for a fill: `rate` per share, or `rate` of notional.
    pub fn for_fill(&self, quantity: i64, price: f64) -> f64 {
        if self.per_share {
            quantity as f64 * self.rate
        } else {
            quantity as f64 * price * self.rate
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokerSettings {
    pub kind: BrokerKind,
    pub host: String,
    pub port: u16,
    pub client_id: i64,
    pub timeout: Duration,
    pub paper_trading: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSettings {
    pub provider: ProviderKind,
    pub path: Option<PathBuf>,
    pub lookback_days: i64,
    pub batch_size: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSettings {
    pub update_frequency: Duration,
    pub max_history: usize,
    pub enforce_exits: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySettings {
    pub kind: StrategyKind,
    pub short_window: usize,
    pub long_window: usize,
    pub symbols: Vec<String>,
    pub position_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradingConfig {
    pub initial_capital: f64,
    pub commission: CommissionSettings,
    pub risk: RiskSettings,
    pub broker: BrokerSettings,
    pub data: DataSettings,
    pub engine: EngineSettings,
    pub strategy: StrategySettings,
    pub log_level: String,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            initial_capital: 100_000.0,
            commission: CommissionSettings {
                rate: 0.001,
                per_share: false,
            },
            risk: RiskSettings::default(),
            broker: BrokerSettings {
                kind: BrokerKind::Mock,
                host: "127.0.0.1".to_string(),
                port: 7497,
                client_id: 1,
                timeout: Duration::from_secs(30),
                paper_trading: true,
            },
            data: DataSettings {
                provider: ProviderKind::Mock,
                path: None,
                lookback_days: 30,
                batch_size: DEFAULT_BATCH_SIZE,
                seed: 42,
            },
            engine: EngineSettings {
                update_frequency: Duration::from_secs(60),
                max_history: DEFAULT_MAX_HISTORY,
                enforce_exits: false,
            },
            strategy: StrategySettings {
                kind: StrategyKind::MovingAverage,
                short_window: 10,
                long_window: 20,
                symbols: vec!["AAPL".to_string()],
                position_fraction: DEFAULT_POSITION_FRACTION,
            },
            log_level: "info".to_string(),
        }
    }
}

fn kind(config: &dyn ConfigPort, section: &str, key: &str, default: &str) -> String {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| default.to_string())
}

fn unsigned(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> u64 {
    u64::try_from(config.get_int(section, key, default)).unwrap_or(0)
}

impl TradingConfig {
    /// Validate and build. Missing keys fall back to defaults.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ScizorError> {
        validate_trading_config(config)?;
        let d = TradingConfig::default();

        let provider = match kind(config, "data", "provider", "mock").as_str() {
            "csv" => ProviderKind::Csv,
            "sqlite" => ProviderKind::Sqlite,
            _ => ProviderKind::Mock,
        };

        Ok(TradingConfig {
            initial_capital: config.get_double("trading", "initial_capital", d.initial_capital),
            commission: CommissionSettings {
                rate: config.get_double("trading", "commission_rate", d.commission.rate),
                per_share: config.get_bool(
                    "trading",
                    "commission_per_share",
                    d.commission.per_share,
                ),
            },
            risk: RiskSettings {
                max_position_size: config.get_double(
                    "risk",
                    "max_position_size",
                    d.risk.max_position_size,
                ),
                stop_loss: config.get_double("risk", "stop_loss", d.risk.stop_loss),
                take_profit: config.get_double("risk", "take_profit", d.risk.take_profit),
                max_drawdown: config.get_double("risk", "max_drawdown", d.risk.max_drawdown),
            },
            broker: BrokerSettings {
                kind: BrokerKind::Mock,
                host: config
                    .get_string("broker", "host")
                    .unwrap_or(d.broker.host),
                port: u16::try_from(config.get_int("broker", "port", 7497))
                    .unwrap_or(d.broker.port),
                client_id: config.get_int("broker", "client_id", d.broker.client_id),
                timeout: Duration::from_secs(unsigned(config, "broker", "timeout", 30)),
                paper_trading: config.get_bool("broker", "paper_trading", true),
            },
            data: DataSettings {
                provider,
                path: config
                    .get_string("data", "path")
                    .filter(|p| !p.trim().is_empty())
                    .map(PathBuf::from),
                lookback_days: config.get_int("data", "lookback_days", d.data.lookback_days),
                batch_size: unsigned(config, "data", "batch_size", 5) as usize,
                seed: unsigned(config, "data", "seed", 42),
            },
            engine: EngineSettings {
                update_frequency: Duration::from_secs(unsigned(
                    config,
                    "engine",
                    "update_frequency",
                    60,
                )),
                max_history: unsigned(config, "engine", "max_history", 10_000) as usize,
                enforce_exits: config.get_bool("engine", "enforce_exits", false),
            },
            strategy: StrategySettings {
                kind: StrategyKind::MovingAverage,
                short_window: unsigned(config, "strategy", "short_window", 10) as usize,
                long_window: unsigned(config, "strategy", "long_window", 20) as usize,
                symbols: config
                    .get_list("strategy", "symbols")
                    .unwrap_or(d.strategy.symbols),
                position_fraction: config.get_double(
                    "strategy",
                    "position_fraction",
                    d.strategy.position_fraction,
                ),
            },
            log_level: config
                .get_string("logging", "level")
                .map(|s| s.trim().to_lowercase())
                .unwrap_or(d.log_level),
        })
    }
}
