//! Shared helpers for integration tests

#![allow(dead_code)]

pub use slowdb::prelude::*;
pub use slowdb::{
    payload, AttributionRegistry, Diagnostic, DiagnosticSink, LocationResolver, SlowMonitor,
    Store, StoreHandle,
};

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Short alias for transaction closures that only fail with store errors
pub type TxResult<T = ()> = std::result::Result<T, Error>;

// ============================================================================
// Diagnostic capture
// ============================================================================

/// Sink that keeps every diagnostic for later inspection
#[derive(Clone, Default)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<Diagnostic>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.records.lock().iter().map(|d| d.to_string()).collect()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.records.lock().iter().map(|d| d.kind()).collect()
    }

    pub fn of_kind(&self, kind: &str) -> Vec<Diagnostic> {
        self.records
            .lock()
            .iter()
            .filter(|d| d.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        self.records.lock().push(diagnostic.clone());
    }
}

/// Ephemeral database reporting into a fresh [`RecordingSink`]
pub fn recording_db(threshold: impl Into<SlowThreshold>) -> (Database, RecordingSink) {
    let sink = RecordingSink::new();
    let db = Database::builder()
        .ephemeral()
        .slow_threshold(threshold)
        .diagnostic_sink(sink.clone())
        .open()
        .expect("ephemeral database");
    (db, sink)
}

// ============================================================================
// Log capture
// ============================================================================

/// In-memory writer for a `tracing_subscriber::fmt` subscriber
#[derive(Clone, Default)]
pub struct CapturedLog {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install as the default subscriber for the current thread
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }

    pub fn clear(&self) {
        self.buf.lock().clear();
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Store doubles
// ============================================================================

/// Store handle that never serializes writers
///
/// Every transaction runs against its own throwaway store, so two write
/// calls can be inside their user functions at the same time. This is the
/// only way to observe a write completing while another write is still
/// attributed.
#[derive(Debug, Default)]
pub struct Unserialized;

impl StoreHandle for Unserialized {
    fn run_write<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Tx) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        Store::ephemeral().update(f)
    }

    fn run_read<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Tx) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        Store::ephemeral().view(f)
    }
}

/// Database over [`Unserialized`] reporting into a fresh sink
pub fn overlapping_db(threshold: Duration) -> (Database<Unserialized>, RecordingSink) {
    let sink = RecordingSink::new();
    let monitor = SlowMonitor::new(SlowThreshold::After(threshold))
        .with_sink(Arc::new(sink.clone()) as Arc<dyn DiagnosticSink>);
    let db = Database::from_parts(Unserialized, monitor, Arc::new(LocationResolver));
    (db, sink)
}

/// Sleep inside a transaction
pub fn hold(d: Duration) -> impl FnOnce(&mut Tx) -> TxResult {
    move |_tx| {
        std::thread::sleep(d);
        Ok(())
    }
}
