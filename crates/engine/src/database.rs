//! Database handle and builder
//!
//! [`Database`] pairs a store with a [`SlowMonitor`] and a call-site
//! resolver. Every transactional entry point is `#[track_caller]`, so the
//! location of the user's call is what gets reported.
//!
//! # Write Sequence
//!
//! ```text
//! db.update(f)                     (caller location captured)
//!   monitor.instrument(Write, ..)  arm watchdog
//!     store.run_write(|tx| ..)     wait for the writer lock
//!       exec.begin()               claim attribution
//!       f(tx)                      user work
//!     commit or roll back
//!   completion                     disarm, classify, report
//! ```

use crate::config::{process_overrides, DatabaseConfig};
use slowdb_concurrency::{DiagnosticSink, SlowCallback, SlowMonitor};
use slowdb_core::{
    payload, BacktraceResolver, CallSite, CallSiteResolver, LocationResolver, OpKind, Result,
    SlowThreshold,
};
use slowdb_storage::{Store, StoreHandle, StoreOptions, StoreStats, Tx};
use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Builder for opening a [`Database`]
///
/// # Example
///
/// ```ignore
/// use slowdb_engine::Database;
/// use std::time::Duration;
///
/// // In-memory, default one-minute threshold
/// let db = Database::builder().ephemeral().open()?;
///
/// // On disk, report anything slower than 2s by file and line only
/// let db = Database::builder()
///     .path("/var/lib/app/data.slowdb")
///     .slow_threshold(Duration::from_secs(2))
///     .resolve_function_names(false)
///     .open()?;
///
/// // No instrumentation at all
/// let db = Database::builder().disable_slow_detection().open_temp()?;
/// ```
pub struct DatabaseBuilder {
    config: DatabaseConfig,
    threshold: Option<SlowThreshold>,
    ephemeral: bool,
    on_slow: Option<SlowCallback>,
    resolver: Option<Arc<dyn CallSiteResolver>>,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl DatabaseBuilder {
    /// Create a builder with defaults: in memory, one-minute threshold
    pub fn new() -> Self {
        Self {
            config: DatabaseConfig::default(),
            threshold: None,
            ephemeral: false,
            on_slow: None,
            resolver: None,
            sink: None,
        }
    }

    /// Start from a loaded configuration
    ///
    /// Builder calls override its fields, and `SLOWDB_SLOW_THRESHOLD` is
    /// applied on top of it when the database is opened.
    pub fn config(mut self, config: DatabaseConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist to a snapshot file at `path`
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.path = Some(path.into());
        self.ephemeral = false;
        self
    }

    /// Keep everything in memory, ignoring any configured path
    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    /// Reject write transactions
    pub fn read_only(mut self) -> Self {
        self.config.read_only = true;
        self
    }

    /// Persist on close instead of on every commit
    pub fn no_sync(mut self) -> Self {
        self.config.no_sync = true;
        self
    }

    /// Set the slow threshold
    ///
    /// Accepts a [`SlowThreshold`] or a plain `Duration`. A zero duration
    /// means the default of one minute. Takes precedence over both the
    /// configuration and the environment.
    pub fn slow_threshold(mut self, threshold: impl Into<SlowThreshold>) -> Self {
        self.threshold = Some(threshold.into());
        self
    }

    /// Turn off slow detection entirely
    pub fn disable_slow_detection(self) -> Self {
        self.slow_threshold(SlowThreshold::Disabled)
    }

    /// Call `f(op, &site)` instead of logging when a call gets stuck
    pub fn on_slow<F>(mut self, f: F) -> Self
    where
        F: Fn(OpKind, &CallSite) + Send + Sync + 'static,
    {
        self.on_slow = Some(Arc::new(f));
        self
    }

    /// Use a custom call-site resolver
    pub fn resolver<R>(mut self, resolver: R) -> Self
    where
        R: CallSiteResolver + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Name the enclosing function in diagnostics (on by default)
    ///
    /// When on, every instrumented call records its stack; symbols are
    /// only looked up for calls that end up in a diagnostic.
    pub fn resolve_function_names(mut self, enabled: bool) -> Self {
        self.config.slow.resolve_function_names = enabled;
        self
    }

    /// Send diagnostics somewhere other than `tracing`
    pub fn diagnostic_sink<K>(mut self, sink: K) -> Self
    where
        K: DiagnosticSink + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Configured path, if any
    pub fn get_path(&self) -> Option<&Path> {
        if self.ephemeral {
            None
        } else {
            self.config.path.as_deref()
        }
    }

    /// Threshold set on the builder or its configuration
    ///
    /// Does not include the environment override applied at open.
    pub fn get_slow_threshold(&self) -> SlowThreshold {
        self.threshold.unwrap_or(self.config.slow.threshold)
    }

    /// Open the database
    ///
    /// Uses the configured path, or stays in memory if none is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot file cannot be read or is corrupt,
    /// or if `SLOWDB_SLOW_THRESHOLD` does not parse.
    pub fn open(mut self) -> Result<Database> {
        self.config = self.effective_config(&process_overrides())?;
        let store = match self.get_path() {
            Some(path) => Store::open(path, self.store_options())?,
            None => Store::ephemeral(),
        };
        Ok(self.finish(store))
    }

    /// Open on a fresh, uniquely named file in the temp directory
    ///
    /// Ignores any configured path. Useful for tests.
    pub fn open_temp(mut self) -> Result<Database> {
        self.config = self.effective_config(&process_overrides())?;
        let path =
            std::env::temp_dir().join(format!("slowdb-test-{}.slowdb", uuid::Uuid::new_v4()));
        let store = Store::open(&path, self.store_options())?;
        Ok(self.finish(store))
    }

    /// Builder calls over `env` over the loaded configuration
    fn effective_config(&self, env: &HashMap<String, String>) -> Result<DatabaseConfig> {
        let mut config = self.config.clone().with_overrides_from(env)?;
        if let Some(threshold) = self.threshold {
            config.slow.threshold = threshold;
        }
        Ok(config)
    }

    fn store_options(&self) -> StoreOptions {
        StoreOptions {
            read_only: self.config.read_only,
            no_sync: self.config.no_sync,
        }
    }

    fn finish<S: StoreHandle>(self, store: S) -> Database<S> {
        let threshold = self.config.slow.threshold;
        let mut monitor = SlowMonitor::new(threshold);
        if let Some(on_slow) = self.on_slow {
            monitor = monitor.with_on_slow(on_slow);
        }
        if let Some(sink) = self.sink {
            monitor = monitor.with_sink(sink);
        }

        let resolver: Arc<dyn CallSiteResolver> = match self.resolver {
            Some(resolver) => resolver,
            None if self.config.slow.resolve_function_names => Arc::new(BacktraceResolver),
            None => Arc::new(LocationResolver),
        };

        info!(
            threshold = %threshold,
            mode = threshold.description(),
            "slow detection configured"
        );
        Database::from_parts(store, monitor, resolver)
    }
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Store handle with slow-call detection
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Database<S: StoreHandle = Store> {
    store: S,
    monitor: SlowMonitor,
    resolver: Arc<dyn CallSiteResolver>,
}

impl Database {
    /// Create a new database builder
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Open a snapshot file with default settings
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        DatabaseBuilder::new().path(path).open()
    }

    /// Snapshot file path, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.store.path()
    }

    /// Persist the committed state now
    pub fn sync(&self) -> Result<()> {
        self.store.sync()
    }

    /// Commit and rollback counters
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Flush pending state and release the handle
    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}

impl<S: StoreHandle> Database<S> {
    /// Assemble a database from an existing store and monitor
    pub fn from_parts(
        store: S,
        monitor: SlowMonitor,
        resolver: Arc<dyn CallSiteResolver>,
    ) -> Self {
        Self {
            store,
            monitor,
            resolver,
        }
    }

    /// Run `f` in an exclusive write transaction
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise. `f`'s error is
    /// returned unchanged.
    #[track_caller]
    pub fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Tx) -> std::result::Result<T, E>,
        E: From<slowdb_core::Error>,
    {
        self.write(Location::caller(), None, f)
    }

    /// Like [`update`](Self::update), attaching `data` to any diagnostic
    /// that names this call, including one blaming it from another call
    #[track_caller]
    pub fn update_with_data<D, T, E, F>(&self, data: D, f: F) -> std::result::Result<T, E>
    where
        D: fmt::Debug + Send + Sync + 'static,
        F: FnOnce(&mut Tx) -> std::result::Result<T, E>,
        E: From<slowdb_core::Error>,
    {
        let data = self.monitor.is_enabled().then(|| payload(data));
        self.write(Location::caller(), data, f)
    }

    /// Run `f` in a shared read transaction
    #[track_caller]
    pub fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Tx) -> std::result::Result<T, E>,
        E: From<slowdb_core::Error>,
    {
        let caller = Location::caller();
        self.monitor.instrument(
            OpKind::Read,
            || self.resolver.resolve(caller),
            None,
            |exec| {
                self.store.run_read(|tx| {
                    exec.begin();
                    f(tx)
                })
            },
        )
    }

    fn write<T, E, F>(
        &self,
        caller: &'static Location<'static>,
        data: Option<slowdb_core::Payload>,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Tx) -> std::result::Result<T, E>,
        E: From<slowdb_core::Error>,
    {
        self.monitor.instrument(
            OpKind::Write,
            || self.resolver.resolve(caller),
            data,
            |exec| {
                self.store.run_write(|tx| {
                    exec.begin();
                    f(tx)
                })
            },
        )
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Slow-call monitor, exposes the registry and watchdog counters
    pub fn monitor(&self) -> &SlowMonitor {
        &self.monitor
    }

    /// Effective slow threshold, `None` when detection is disabled
    pub fn slow_threshold(&self) -> Option<std::time::Duration> {
        self.monitor.threshold()
    }
}

impl<S: StoreHandle + fmt::Debug> fmt::Debug for Database<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("store", &self.store)
            .field("monitor", &self.monitor)
            .finish()
    }
}
