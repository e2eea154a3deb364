//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod mock_broker;
pub mod mock_data_provider;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
