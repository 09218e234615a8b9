//! Database engine for slowdb
//!
//! This crate wires the store to slow-call detection:
//! - Database: instrumented `update`, `update_with_data` and `view`
//! - DatabaseBuilder: fluent configuration and opening
//! - DatabaseConfig: TOML and environment configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod database;

pub use config::{DatabaseConfig, SlowConfig, SLOW_THRESHOLD_ENV};
pub use database::{Database, DatabaseBuilder};
