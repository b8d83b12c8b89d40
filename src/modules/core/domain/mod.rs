//! Domain models for Unibase

mod config;
mod model;
mod query;
mod types;

pub use config::{ApiMode, ConnectorConfig, SqlDriver, DRIVER_OPTION, POLL_PATH_OPTION};
pub use model::Model;
pub use query::{GenericQuery, Operation};
pub use types::PoolConfig;
