//! # slowdb
//!
//! Embedded bucketed key/value store that reports slow transactions and
//! names who was holding the write lock.
//!
//! ## Quick Start
//!
//! ```ignore
//! use slowdb::prelude::*;
//! use std::time::Duration;
//!
//! let db = Database::builder()
//!     .path("./app.slowdb")
//!     .slow_threshold(Duration::from_secs(1))
//!     .open()?;
//!
//! db.update_with_data("nightly import", |tx| {
//!     let mut users = tx.create_bucket_if_not_exists(b"users")?;
//!     users.put(b"alice", b"admin")?;
//!     Ok::<_, Error>(())
//! })?;
//!
//! db.close()?;
//! ```
//!
//! ## Slow Detection
//!
//! - Every `update`/`view` arms a watchdog that reports the call as stuck
//!   once it crosses the threshold.
//! - On completion a slow write is classified: slow itself (`SLOWEST`),
//!   blocked by another holder (names the holder, its held time and data),
//!   or unattributed.
//! - [`SlowThreshold::Disabled`] turns all of it off with zero overhead.
//!
//! Diagnostics are logged with `tracing` on target `slowdb::slow` unless a
//! [`DiagnosticSink`] or `on_slow` callback is configured.

#![warn(missing_docs)]

pub mod prelude;

pub use slowdb_concurrency::{
    AttributionRegistry, Blame, ClaimOutcome, Completion, Diagnostic, DiagnosticSink, Holder,
    SlowMonitor, TracingSink, Watchdog, SLOW_LOG_TARGET,
};
pub use slowdb_core::{
    payload, BacktraceResolver, CallSite, CallSiteResolver, Error, LocationResolver, OpKind,
    Payload, Result, SlowThreshold, DEFAULT_SLOW_THRESHOLD,
};
pub use slowdb_engine::{
    Database, DatabaseBuilder, DatabaseConfig, SlowConfig, SLOW_THRESHOLD_ENV,
};
pub use slowdb_storage::{Bucket, BucketMut, Store, StoreHandle, StoreOptions, StoreStats, Tx};
