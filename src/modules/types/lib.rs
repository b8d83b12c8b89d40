//! Type definitions for Unibase
//!
//! This crate contains shared type definitions used across the Unibase codebase,
//! including connector kinds, the generic record shape, and response types.

pub mod connector;
pub mod record;
pub mod runtime;

pub use connector::ConnectorKind;
pub use record::{affected_record, record_from_value, Record, Records, AFFECTED_FIELD};
pub use runtime::{ConnectorStatus, QueryResponse};
