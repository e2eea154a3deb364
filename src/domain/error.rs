//! Domain error types.

/// Top-level error type for scizor.
#[derive(Debug, thiserror::Error)]
pub enum ScizorError {
    #[error("not connected to broker")]
    NotConnected,

    #[error("broker error: {reason}")]
    Broker { reason: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("cannot {operation} while engine is {state}")]
    InvalidState { state: String, operation: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScizorError {
    pub fn broker(reason: impl Into<String>) -> Self {
        ScizorError::Broker {
            reason: reason.into(),
        }
    }

    pub fn data(reason: impl Into<String>) -> Self {
        ScizorError::Data {
            reason: reason.into(),
        }
    }

    /// Connectivity failures are surfaced to the caller and never retried by the core.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ScizorError::NotConnected)
    }
}

impl From<&ScizorError> for std::process::ExitCode {
    fn from(err: &ScizorError) -> Self {
        let code: u8 = match err {
            ScizorError::Io(_) => 1,
            ScizorError::ConfigParse { .. }
            | ScizorError::ConfigMissing { .. }
            | ScizorError::ConfigInvalid { .. } => 2,
            ScizorError::Database { .. } | ScizorError::DatabaseQuery { .. } => 3,
            ScizorError::NotConnected
            | ScizorError::Broker { .. }
            | ScizorError::InvalidState { .. } => 4,
            ScizorError::Data { .. } | ScizorError::NoData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(ScizorError::NotConnected.to_string(), "not connected to broker");
        assert_eq!(
            ScizorError::ConfigMissing {
                section: "risk".into(),
                key: "max_drawdown".into(),
            }
            .to_string(),
            "missing config key [risk] max_drawdown"
        );
        assert_eq!(
            ScizorError::InvalidState {
                state: "running".into(),
                operation: "start".into(),
            }
            .to_string(),
            "cannot start while engine is running"
        );
    }

    #[test]
    fn connectivity_classification() {
        assert!(ScizorError::NotConnected.is_connectivity());
        assert!(!ScizorError::broker("rejected").is_connectivity());
        assert!(!ScizorError::data("timeout").is_connectivity());
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ScizorError = io.into();
        assert!(matches!(err, ScizorError::Io(_)));
    }
}
