//! Convenient imports for slowdb.
//!
//! ```ignore
//! use slowdb::prelude::*;
//!
//! let db = Database::open("./app.slowdb")?;
//! db.view(|tx| Ok::<_, Error>(tx.bucket_names()))?;
//! ```

// Main entry point
pub use crate::{Database, DatabaseBuilder, DatabaseConfig};

// Error handling
pub use crate::{Error, Result};

// Transactions
pub use crate::{Bucket, BucketMut, Tx};

// Slow detection
pub use crate::{CallSite, OpKind, SlowThreshold};
