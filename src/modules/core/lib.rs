//! Core domain logic for Unibase
//!
//! This crate contains the connector configuration, the generic query model,
//! and the error taxonomy shared by every Unibase component.

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::{ErrorKind, Result, UnibaseError};
