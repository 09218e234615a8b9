//! Storage layer for slowdb
//!
//! This crate implements the embedded store the instrumentation wraps:
//! - Store: single-writer / many-reader transactions
//! - Tx / Bucket / BucketMut: copy-on-write bucketed key/value access
//! - StoreHandle: the transaction-runner seam the engine instruments
//! - Snapshot file format with CRC32 validation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod store;
pub mod tx;

pub use format::{SNAPSHOT_FORMAT_VERSION, SNAPSHOT_HEADER_SIZE, SNAPSHOT_MAGIC};
pub use store::{Store, StoreHandle, StoreOptions, StoreStats};
pub use tx::{Bucket, BucketMut, BucketStats, Iter, Tx, TxStats};
