//! Core domain types and logic.

pub mod config;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod indicator;
pub mod metrics;
pub mod moving_average;
pub mod ohlcv;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod risk;
pub mod signal;
pub mod strategy;
