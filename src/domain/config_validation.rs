//! Configuration validation.
//!
//! Validates every config field before an engine is built.

use crate::domain::error::ScizorError;
use crate::ports::config_port::ConfigPort;

pub const BROKER_KINDS: &[&str] = &["mock"];
pub const PROVIDER_KINDS: &[&str] = &["mock", "csv", "sqlite"];
pub const STRATEGY_KINDS: &[&str] = &["moving_average"];

pub fn validate_trading_config(config: &dyn ConfigPort) -> Result<(), ScizorError> {
    validate_initial_capital(config)?;
    validate_commission(config)?;
    validate_risk(config)?;
    validate_broker(config)?;
    validate_data(config)?;
    validate_engine(config)?;
    validate_strategy(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> ScizorError {
    ScizorError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), ScizorError> {
    let value = config.get_double("trading", "initial_capital", 100_000.0);
    if !(value > 0.0) {
        return Err(invalid(
            "trading",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), ScizorError> {
    let rate = config.get_double("trading", "commission_rate", 0.001);
    if rate < 0.0 {
        return Err(invalid(
            "trading",
            "commission_rate",
            "commission_rate must be non-negative",
        ));
    }
    Ok(())
}

fn validate_fraction(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<(), ScizorError> {
    let value = config.get_double(section, key, default);
    if !(value > 0.0 && value <= 1.0) {
        return Err(invalid(section, key, format!("{key} must be in (0, 1]")));
    }
    Ok(())
}

fn validate_risk(config: &dyn ConfigPort) -> Result<(), ScizorError> {
    validate_fraction(config, "risk", "max_position_size", 0.10)?;
    validate_fraction(config, "risk", "stop_loss", 0.02)?;
    validate_fraction(config, "risk", "take_profit", 0.06)?;
    validate_fraction(config, "risk", "max_drawdown", 0.15)?;
    Ok(())
}

fn validate_kind(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: &str,
    allowed: &[&str],
) -> Result<String, ScizorError> {
    let kind = config
        .get_string(section, key)
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| default.to_string());
    if !allowed.contains(&kind.as_str()) {
        return Err(invalid(
            section,
            key,
            format!("unknown {key} '{kind}', expected one of: {}", allowed.join(", ")),
        ));
    }
    Ok(kind)
}

fn validate_broker(config: &dyn ConfigPort) -> Result<(), ScizorError> {
    validate_kind(config, "broker", "kind", "mock", BROKER_KINDS)?;

    let port = config.get_int("broker", "port", 7497);
    if !(1..=i64::from(u16::MAX)).contains(&port) {
        return Err(invalid("broker", "port", "port must be between 1 and 65535"));
    }
    if config.get_int("broker", "timeout", 30) <= 0 {
        return Err(invalid("broker", "timeout", "timeout must be positive"));
    }
    Ok(())
}

fn validate_data(config: &dyn ConfigPort) -> Result<(), ScizorError> {
    let provider = validate_kind(config, "data", "provider", "mock", PROVIDER_KINDS)?;

    if provider != "mock" {
        match config.get_string("data", "path") {
            Some(p) if !p.trim().is_empty() => {}
            _ => {
                return Err(ScizorError::ConfigMissing {
                    section: "data".to_string(),
                    key: "path".to_string(),
                });
            }
        }
    }

    if config.get_int("data", "lookback_days", 30) <= 0 {
        return Err(invalid("data", "lookback_days", "lookback_days must be positive"));
    }
    if config.get_int("data", "batch_size", 5) <= 0 {
        return Err(invalid("data", "batch_size", "batch_size must be positive"));
    }
    Ok(())
}

fn validate_engine(config: &dyn ConfigPort) -> Result<(), ScizorError> {
    if config.get_int("engine", "update_frequency", 60) <= 0 {
        return Err(invalid(
            "engine",
            "update_frequency",
            "update_frequency must be positive",
        ));
    }
    if config.get_int("engine", "max_history", 10_000) <= 0 {
        return Err(invalid("engine", "max_history", "max_history must be positive"));
    }
    Ok(())
}

fn validate_strategy(config: &dyn ConfigPort) -> Result<(), ScizorError> {
    validate_kind(config, "strategy", "name", "moving_average", STRATEGY_KINDS)?;

    let short = config.get_int("strategy", "short_window", 10);
    let long = config.get_int("strategy", "long_window", 20);
    if short <= 0 {
        return Err(invalid("strategy", "short_window", "short_window must be positive"));
    }
    if long <= 0 {
        return Err(invalid("strategy", "long_window", "long_window must be positive"));
    }
    if short >= long {
        return Err(invalid(
            "strategy",
            "short_window",
            "short_window must be less than long_window",
        ));
    }

    if config
        .get_list("strategy", "symbols")
        .is_some_and(|symbols| symbols.is_empty())
    {
        return Err(invalid("strategy", "symbols", "symbols must not be empty"));
    }

    validate_fraction(config, "strategy", "position_fraction", 0.10)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn empty_config_uses_valid_defaults() {
        let config = make_config("");
        assert!(validate_trading_config(&config).is_ok());
    }

    #[test]
    fn valid_full_config_passes() {
        let config = make_config(
            r#"
[trading]
initial_capital = 50000
commission_rate = 0.0005

[risk]
max_position_size = 0.2
stop_loss = 0.05
take_profit = 0.1
max_drawdown = 0.2

[broker]
kind = mock
port = 7497

[data]
provider = csv
path = /tmp/bars
batch_size = 3

[engine]
update_frequency = 5
max_history = 100

[strategy]
name = moving_average
short_window = 5
long_window = 15
symbols = AAPL, MSFT
"#,
        );
        assert!(validate_trading_config(&config).is_ok());
    }

    #[test]
    fn initial_capital_must_be_positive() {
        let config = make_config("[trading]\ninitial_capital = 0\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(
            matches!(err, ScizorError::ConfigInvalid { key, .. } if key == "initial_capital")
        );
    }

    #[test]
    fn commission_negative_fails() {
        let config = make_config("[trading]\ncommission_rate = -0.1\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(
            matches!(err, ScizorError::ConfigInvalid { key, .. } if key == "commission_rate")
        );
    }

    #[test]
    fn risk_fraction_out_of_range_fails() {
        let config = make_config("[risk]\nmax_position_size = 1.5\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(
            matches!(err, ScizorError::ConfigInvalid { key, .. } if key == "max_position_size")
        );

        let config = make_config("[risk]\nmax_drawdown = 0\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(matches!(err, ScizorError::ConfigInvalid { key, .. } if key == "max_drawdown"));
    }

    #[test]
    fn unknown_broker_kind_fails() {
        let config = make_config("[broker]\nkind = carrier_pigeon\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(matches!(err, ScizorError::ConfigInvalid { section, .. } if section == "broker"));
    }

    #[test]
    fn unknown_provider_fails() {
        let config = make_config("[data]\nprovider = teletype\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(matches!(err, ScizorError::ConfigInvalid { key, .. } if key == "provider"));
    }

    #[test]
    fn file_provider_requires_path() {
        let config = make_config("[data]\nprovider = csv\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(matches!(err, ScizorError::ConfigMissing { key, .. } if key == "path"));
    }

    #[test]
    fn zero_batch_size_fails() {
        let config = make_config("[data]\nbatch_size = 0\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(matches!(err, ScizorError::ConfigInvalid { key, .. } if key == "batch_size"));
    }

    #[test]
    fn engine_limits() {
        let config = make_config("[engine]\nupdate_frequency = 0\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(
            matches!(err, ScizorError::ConfigInvalid { key, .. } if key == "update_frequency")
        );

        let config = make_config("[engine]\nmax_history = 0\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(matches!(err, ScizorError::ConfigInvalid { key, .. } if key == "max_history"));
    }

    #[test]
    fn short_window_must_be_below_long() {
        let config = make_config("[strategy]\nshort_window = 20\nlong_window = 20\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(matches!(err, ScizorError::ConfigInvalid { key, .. } if key == "short_window"));
    }

    #[test]
    fn zero_window_fails() {
        let config = make_config("[strategy]\nshort_window = 0\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(matches!(err, ScizorError::ConfigInvalid { key, .. } if key == "short_window"));
    }

    #[test]
    fn empty_symbols_fail() {
        let config = make_config("[strategy]\nsymbols = ,\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(matches!(err, ScizorError::ConfigInvalid { key, .. } if key == "symbols"));
    }

    #[test]
    fn unknown_strategy_fails() {
        let config = make_config("[strategy]\nname = astrology\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(matches!(err, ScizorError::ConfigInvalid { key, .. } if key == "name"));
    }
}
