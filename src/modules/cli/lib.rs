//! Unibase CLI
//!
//! This crate provides the command-line interface for Unibase:
//! - check: Connect and ping every configured connector
//! - query: Run one generic query against a named connector
//! - init: Write a starter configuration

pub mod commands;

pub use commands::{Cli, Commands};
