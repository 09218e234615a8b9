//! Slow-call detection for slowdb
//!
//! This crate times store operations and attributes slowness:
//! - Watchdog: one-shot cancellable monitor per in-flight call
//! - AttributionRegistry: which write call currently holds the lock
//! - Diagnostics: the reports and the sinks they go to
//! - SlowMonitor: ties the three together around one operation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attribution;
pub mod diagnostics;
pub mod monitor;
pub mod watchdog;

pub use attribution::{AttributionRegistry, ClaimOutcome, ClaimToken, Holder};
pub use diagnostics::{
    Blame, Diagnostic, DiagnosticSink, SlowCallback, TracingSink, SLOW_LOG_TARGET,
};
pub use monitor::{Completion, Execution, SlowMonitor};
pub use watchdog::{Watchdog, WatchdogHandle};
