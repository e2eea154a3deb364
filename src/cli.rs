//! CLI definition and dispatch.

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvDataProvider;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::mock_broker::MockBroker;
use crate::adapters::mock_data_provider::MockDataProvider;
use crate::domain::config::{BrokerKind, ProviderKind, StrategyKind, TradingConfig};
use crate::domain::config_validation::validate_trading_config;
use crate::domain::engine::TradingEngine;
use crate::domain::error::ScizorError;
use crate::domain::moving_average::MovingAverageCrossover;
use crate::domain::strategy::Strategy;
use crate::ports::broker_port::Broker;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{DataProvider, FetchWindow};

#[derive(Parser, Debug)]
#[command(name = "scizor", about = "Algorithmic trading engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the live trading loop until Ctrl-C
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Stop after this many iterations
        #[arg(short, long)]
        iterations: Option<u64>,
    },
    /// Run a single iteration and print the engine status as JSON
    Step {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a trading configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List the symbols available from the configured data provider
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run { config, iterations } => run_live(&config, iterations),
        Command::Step { config } => run_step(&config),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { config } => run_list_symbols(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

/// `RUST_LOG` wins over `[logging] level`.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn build_strategy(config: &TradingConfig) -> Box<dyn Strategy> {
    let settings = &config.strategy;
    match settings.kind {
        StrategyKind::MovingAverage => Box::new(
            MovingAverageCrossover::new(
                settings.short_window,
                settings.long_window,
                settings.symbols.clone(),
            )
            .with_position_fraction(settings.position_fraction),
        ),
    }
}

pub fn build_broker(config: &TradingConfig) -> Box<dyn Broker> {
    match config.broker.kind {
        BrokerKind::Mock => Box::new(MockBroker::from_settings(
            &config.broker,
            config.initial_capital,
            config.commission,
        )),
    }
}

fn fetch_window(config: &TradingConfig) -> FetchWindow {
    FetchWindow {
        lookback_days: config.data.lookback_days,
        batch_size: config.data.batch_size,
        as_of: None,
    }
}

fn required_path(config: &TradingConfig) -> Result<PathBuf, ScizorError> {
    config
        .data
        .path
        .clone()
        .ok_or_else(|| ScizorError::ConfigMissing {
            section: "data".into(),
            key: "path".into(),
        })
}

/// `source` is the raw configuration; the sqlite provider reads its pool
/// settings from it.
pub fn build_data_provider(
    config: &TradingConfig,
    source: &dyn ConfigPort,
) -> Result<Box<dyn DataProvider>, ScizorError> {
    let window = fetch_window(config);
    match config.data.provider {
        ProviderKind::Mock => Ok(Box::new(
            MockDataProvider::new(config.data.seed).with_window(window),
        )),
        ProviderKind::Csv => Ok(Box::new(
            CsvDataProvider::new(required_path(config)?).with_window(window),
        )),
        #[cfg(feature = "sqlite")]
        ProviderKind::Sqlite => {
            let provider =
                crate::adapters::sqlite_adapter::SqliteDataProvider::from_config(source)?
                    .with_window(window);
            provider.initialize_schema()?;
            Ok(Box::new(provider))
        }
        #[cfg(not(feature = "sqlite"))]
        ProviderKind::Sqlite => {
            let _ = source;
            Err(ScizorError::ConfigInvalid {
                section: "data".into(),
                key: "provider".into(),
                reason: "built without sqlite support".into(),
            })
        }
    }
}

pub fn build_engine(
    config: &TradingConfig,
    source: &dyn ConfigPort,
) -> Result<TradingEngine, ScizorError> {
    let data = build_data_provider(config, source)?;
    Ok(TradingEngine::from_config(
        config,
        build_strategy(config),
        build_broker(config),
        data,
    ))
}

fn prepare(config_path: &Path) -> Result<(FileConfigAdapter, TradingConfig), ExitCode> {
    let adapter = load_config(config_path)?;
    let config = TradingConfig::from_config(&adapter).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })?;
    init_logging(&config.log_level);
    Ok((adapter, config))
}

fn runtime() -> Result<tokio::runtime::Runtime, ScizorError> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn finish(result: Result<(), ScizorError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn run_live(config_path: &Path, iterations: Option<u64>) -> ExitCode {
    let (adapter, config) = match prepare(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let mut engine = match build_engine(&config, &adapter) {
        Ok(e) => e,
        Err(e) => return finish(Err(e)),
    };

    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => return finish(Err(e)),
    };

    finish(rt.block_on(async move {
        engine.start().await?;

        let handle = engine.stop_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping after current iteration");
                handle.stop();
            }
        });

        match iterations {
            None => engine.run_live(None).await?,
            Some(n) => engine.run_iterations(n).await?,
        }

        let summary = engine.portfolio().performance_summary();
        eprintln!(
            "Final value: {:.2} ({:+.2}%)",
            summary.current_value, summary.total_return_pct
        );
        Ok(())
    }))
}

fn run_step(config_path: &Path) -> ExitCode {
    let (adapter, config) = match prepare(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let mut engine = match build_engine(&config, &adapter) {
        Ok(e) => e,
        Err(e) => return finish(Err(e)),
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => return finish(Err(e)),
    };

    finish(rt.block_on(async move {
        engine.start().await?;
        let report = engine.run_single_iteration(Utc::now()).await;
        let status = engine.status();
        engine.stop().await;
        report?;

        let json = serde_json::to_string_pretty(&status)
            .map_err(|e| ScizorError::data(format!("failed to serialise status: {e}")))?;
        println!("{json}");
        Ok(())
    }))
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_trading_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let config = match TradingConfig::from_config(&adapter) {
        Ok(c) => c,
        Err(e) => return finish(Err(e)),
    };
    eprintln!("  Initial capital: {:.2}", config.initial_capital);
    eprintln!("  Data provider:   {:?}", config.data.provider);
    eprintln!(
        "  Strategy:        moving average {}/{} on {}",
        config.strategy.short_window,
        config.strategy.long_window,
        config.strategy.symbols.join(", ")
    );
    eprintln!("Configuration is valid.");
    ExitCode::SUCCESS
}

/// Symbols the configured provider can serve. The mock provider serves any
/// symbol, so the strategy's symbol list is printed.
pub fn available_symbols(
    config: &TradingConfig,
    source: &dyn ConfigPort,
) -> Result<Vec<String>, ScizorError> {
    match config.data.provider {
        ProviderKind::Mock => Ok(config.strategy.symbols.clone()),
        ProviderKind::Csv => CsvDataProvider::new(required_path(config)?).available_symbols(),
        #[cfg(feature = "sqlite")]
        ProviderKind::Sqlite => {
            let provider = crate::adapters::sqlite_adapter::SqliteDataProvider::from_config(source)?;
            provider.initialize_schema()?;
            provider.active_symbols()
        }
        #[cfg(not(feature = "sqlite"))]
        ProviderKind::Sqlite => {
            let _ = source;
            Err(ScizorError::ConfigInvalid {
                section: "data".into(),
                key: "provider".into(),
                reason: "built without sqlite support".into(),
            })
        }
    }
}

fn run_list_symbols(config_path: &Path) -> ExitCode {
    let (adapter, config) = match prepare(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match available_symbols(&config, &adapter) {
        Ok(symbols) => {
            for symbol in &symbols {
                println!("{symbol}");
            }
            eprintln!("{} symbols", symbols.len());
            ExitCode::SUCCESS
        }
        Err(e) => finish(Err(e)),
    }
}
