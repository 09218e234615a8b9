//! On-disk byte format for store snapshots.
//!
//! Keeping serialization separate from operational logic (how and when the
//! store persists) makes format evolution easier to manage.
//!
//! # Module Structure
//!
//! - `snapshot`: snapshot file header, body encoding and atomic file I/O

pub mod snapshot;

pub use snapshot::{SNAPSHOT_FORMAT_VERSION, SNAPSHOT_HEADER_SIZE, SNAPSHOT_MAGIC};
pub(crate) use snapshot::{read_snapshot_file, write_snapshot_file};
