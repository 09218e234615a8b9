//! Core types for slowdb
//!
//! This crate defines the vocabulary shared by every layer:
//! - CallSite: resolved identity of the code that invoked an operation
//! - CallSiteResolver: injected capability that produces call sites
//! - SlowThreshold: the watchdog threshold with its sentinels
//! - OpKind / Payload: what is being timed and what rides along with it
//! - Error / Result: the unified error type

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call_site;
pub mod error;
pub mod op;
pub mod threshold;

pub use call_site::{BacktraceResolver, CallSite, CallSiteResolver, LocationResolver};
pub use error::{Error, Result};
pub use op::{payload, OpKind, Payload};
pub use threshold::{format_duration, parse_duration, SlowThreshold, DEFAULT_SLOW_THRESHOLD};
