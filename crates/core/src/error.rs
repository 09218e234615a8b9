//! Error types for slowdb
//!
//! Covers storage failures and construction-time configuration faults.
//! Errors returned by user transaction closures never pass through this
//! type; they are carried back to the caller untouched.

use std::io;
use thiserror::Error;

/// Result type alias for slowdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the store and by database construction
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error while reading or writing the snapshot file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Snapshot file failed validation (bad magic, checksum mismatch)
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// Bucket does not exist
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// Bucket already exists
    #[error("bucket already exists: {0}")]
    BucketExists(String),

    /// Bucket names and keys must be non-empty
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Mutation attempted inside a read-only transaction
    #[error("transaction is not writable")]
    TxNotWritable,

    /// Write transaction attempted on a store opened read-only
    #[error("database opened in read-only mode")]
    ReadOnly,

    /// Invalid configuration detected while building a database
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this error is a configuration fault
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::BucketNotFound(_))
    }

    /// Check if the on-disk data is damaged
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
