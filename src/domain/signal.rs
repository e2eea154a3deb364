//! Trading signals produced by strategies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(SignalAction::Buy),
            "sell" => Some(SignalAction::Sell),
            "hold" => Some(SignalAction::Hold),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "buy",
            SignalAction::Sell => "sell",
            SignalAction::Hold => "hold",
        }
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable trading intent. Fields are private; build with [`Signal::new`]
/// and the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    symbol: String,
    action: SignalAction,
    quantity: i64,
    price: Option<f64>,
    timestamp: DateTime<Utc>,
    confidence: f64,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl Signal {
    pub fn new(
        symbol: impl Into<String>,
        action: SignalAction,
        quantity: i64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Signal {
            symbol: symbol.into(),
            action,
            quantity,
            price: None,
            timestamp,
            confidence: 1.0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn hold(symbol: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Signal::new(symbol, SignalAction::Hold, 0, timestamp)
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Confidence is clamped into [0, 1]; NaN becomes 0.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn action(&self) -> SignalAction {
        self.action
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn price(&self) -> Option<f64> {
        self.price
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn is_actionable(&self) -> bool {
        self.action != SignalAction::Hold
    }
}
