//! The store handle
//!
//! `Store` provides single-writer / many-reader transactions over bucketed
//! key/value data:
//! - Writers are serialized by a commit lock held for the whole closure
//! - Readers take the committed snapshot and never wait for the writer
//! - A write commits when its closure returns `Ok`; `Err` or a panic rolls
//!   it back
//!
//! # Commit Sequence
//!
//! ```text
//! 1. Acquire writer lock (blocks while another write runs)
//! 2. Clone committed snapshot pointer
//! 3. Run closure against copy-on-write Tx
//! 4. IF Err: drop Tx (rollback), return error
//! 5. IF dirty: bump sequence, persist snapshot file (unless no_sync)
//! 6. Publish snapshot to readers
//! 7. Release writer lock
//! ```

use crate::format::{read_snapshot_file, write_snapshot_file};
use crate::tx::{Snapshot, Tx};
use parking_lot::{Mutex, RwLock};
use slowdb_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Transaction runner consumed by the instrumentation layer
///
/// Implementations guarantee that at most one `run_write` closure executes
/// at a time, while any number of `run_read` closures may run concurrently.
/// Closure errors are returned unchanged; store failures are converted into
/// the caller's error type through `From<Error>`.
pub trait StoreHandle: Send + Sync {
    /// Run an exclusive write transaction
    fn run_write<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Tx) -> std::result::Result<T, E>,
        E: From<Error>;

    /// Run a shared read transaction
    fn run_read<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Tx) -> std::result::Result<T, E>,
        E: From<Error>;
}

/// Options for opening a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Reject write transactions
    pub read_only: bool,
    /// Skip persisting on every commit; call [`Store::sync`] explicitly
    pub no_sync: bool,
}

/// Counters describing store activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Write transactions that committed changes
    pub commits: u64,
    /// Write transactions whose closure returned an error
    pub rollbacks: u64,
    /// Current commit sequence
    pub sequence: u64,
}

/// Bucketed key/value store
pub struct Store {
    path: Option<PathBuf>,
    options: StoreOptions,
    committed: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

impl Store {
    /// Create a store that lives only in memory
    pub fn ephemeral() -> Self {
        Self::from_snapshot(None, StoreOptions::default(), Snapshot::default())
    }

    /// Open (or create) a store backed by the snapshot file at `path`
    ///
    /// A missing file yields an empty store; the file is created on the
    /// first commit.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or fails validation.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match read_snapshot_file(&path)? {
            Some(snapshot) => {
                info!(
                    path = %path.display(),
                    sequence = snapshot.sequence,
                    buckets = snapshot.buckets.len(),
                    "loaded snapshot"
                );
                snapshot
            }
            None => {
                debug!(path = %path.display(), "no snapshot file, starting empty");
                Snapshot::default()
            }
        };
        Ok(Self::from_snapshot(Some(path), options, snapshot))
    }

    fn from_snapshot(path: Option<PathBuf>, options: StoreOptions, snapshot: Snapshot) -> Self {
        Self {
            path,
            options,
            committed: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
            commits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
        }
    }

    /// Snapshot file path, `None` for ephemeral stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Check if this store has no backing file
    pub fn is_ephemeral(&self) -> bool {
        self.path.is_none()
    }

    /// Options the store was opened with
    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Run an exclusive write transaction
    ///
    /// Blocks until no other write transaction is running.
    pub fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Tx) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        if self.options.read_only {
            return Err(Error::ReadOnly.into());
        }

        let _writer = self.writer.lock();
        let base = Arc::clone(&self.committed.read());
        let mut tx = Tx::write(base);

        let value = match f(&mut tx) {
            Ok(value) => value,
            Err(e) => {
                self.rollbacks.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        if tx.is_dirty() {
            let mut snapshot = tx.into_snapshot();
            Arc::make_mut(&mut snapshot).sequence += 1;
            if let (Some(path), false) = (&self.path, self.options.no_sync) {
                write_snapshot_file(path, &snapshot)?;
            }
            *self.committed.write() = snapshot;
            self.commits.fetch_add(1, Ordering::Relaxed);
        }

        Ok(value)
    }

    /// Run a shared read transaction
    ///
    /// Sees the last committed snapshot; never waits for a running writer.
    pub fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Tx) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let snapshot = Arc::clone(&self.committed.read());
        let tx = Tx::read(snapshot);
        f(&tx)
    }

    /// Persist the committed snapshot now
    ///
    /// No-op for ephemeral and read-only stores.
    pub fn sync(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if self.options.read_only {
            return Ok(());
        }
        let _writer = self.writer.lock();
        let snapshot = Arc::clone(&self.committed.read());
        write_snapshot_file(path, &snapshot)
    }

    /// Flush pending state before shutdown
    pub fn close(&self) -> Result<()> {
        if self.options.no_sync {
            self.sync()?;
        }
        info!(sequence = self.stats().sequence, "store closed");
        Ok(())
    }

    /// Activity counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            sequence: self.committed.read().sequence,
        }
    }
}

impl StoreHandle for Store {
    fn run_write<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Tx) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.update(f)
    }

    fn run_read<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Tx) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.view(f)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("stats", &self.stats())
            .finish()
    }
}
