//! scizor: an algorithmic trading core covering portfolio and risk
//! accounting, strategy signals, broker routing and runtime metrics.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
