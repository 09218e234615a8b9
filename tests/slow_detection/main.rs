//! Slow Detection Integration Tests
//!
//! End-to-end behaviour of the watchdog, attribution and diagnostics
//! through the public `Database` API.

#[path = "../common/mod.rs"]
mod common;

mod attribution;
mod logging;
mod scenario;
