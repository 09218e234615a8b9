//! Slow-call orchestration
//!
//! [`SlowMonitor`] wraps one store operation: it resolves the caller, arms a
//! watchdog, lets the body claim the attribution registry once the store is
//! actually running it, and classifies the call on completion.
//!
//! # Call Sequence
//!
//! ```text
//! instrument(op, site, payload, body)
//!   |
//!   +-- disabled? --------------------------------> body(&Execution::detached)
//!   |
//!   +-- resolve site, started = now, arm watchdog      WAITING
//!   +-- body(&exec)
//!   |     +-- store acquires its lock
//!   |     +-- exec.begin(): claim registry (writes)    EXECUTING
//!   |     +-- user function
//!   +-- completion guard (also runs on unwind)
//!         +-- disarm watchdog (never waits for it)
//!         +-- elapsed <= threshold: release own claim  COMPLETED_FAST
//!         +-- own claim: release, SLOWEST              COMPLETED_SLOW_SELF
//!         +-- other holder: blame it                   COMPLETED_SLOW_BLOCKED
//!         +-- otherwise: plain report                  COMPLETED_SLOW_UNATTRIBUTED
//! ```
//!
//! Reads never claim and never blame. Diagnostics are emitted only after the
//! registry lock is released.

use crate::attribution::{AttributionRegistry, ClaimOutcome, ClaimToken};
use crate::diagnostics::{Blame, Diagnostic, DiagnosticSink, SlowCallback, TracingSink};
use crate::watchdog::{Watchdog, WatchdogHandle};
use slowdb_core::{CallSite, OpKind, Payload, SlowThreshold};
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How an instrumented call finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Within the threshold, nothing reported
    Fast,
    /// Slow while holding the lock itself
    SlowSelf,
    /// Slow while another call held the lock
    SlowBlocked,
    /// Slow with no known holder
    SlowUnattributed,
}

impl Completion {
    /// Whether a diagnostic was emitted
    pub fn is_slow(&self) -> bool {
        !matches!(self, Completion::Fast)
    }
}

/// Slow-call detector shared by every operation on one database handle
#[derive(Clone)]
pub struct SlowMonitor {
    threshold: Option<Duration>,
    registry: Arc<AttributionRegistry>,
    watchdog: Watchdog,
    on_slow: Option<SlowCallback>,
    sink: Arc<dyn DiagnosticSink>,
}

impl SlowMonitor {
    /// Create a monitor logging through [`TracingSink`]
    pub fn new(threshold: SlowThreshold) -> Self {
        Self {
            threshold: threshold.resolve(),
            registry: Arc::new(AttributionRegistry::new()),
            watchdog: Watchdog::new(),
            on_slow: None,
            sink: Arc::new(TracingSink),
        }
    }

    /// Monitor that never instruments anything
    pub fn disabled() -> Self {
        Self::new(SlowThreshold::Disabled)
    }

    /// Replace the default "stuck" diagnostic with a callback
    pub fn with_on_slow(mut self, on_slow: SlowCallback) -> Self {
        self.on_slow = Some(on_slow);
        self
    }

    /// Route diagnostics to a custom sink
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Whether calls are instrumented at all
    pub fn is_enabled(&self) -> bool {
        self.threshold.is_some()
    }

    /// Effective threshold, `None` when disabled
    pub fn threshold(&self) -> Option<Duration> {
        self.threshold
    }

    /// Attribution registry owned by this monitor
    pub fn registry(&self) -> &Arc<AttributionRegistry> {
        &self.registry
    }

    /// Watchdog factory, exposes monitor counters
    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Run `body` as one instrumented operation
    ///
    /// `site` is only invoked when the monitor is enabled. The body must
    /// call [`Execution::begin`] once the store has started running the
    /// user function.
    pub fn instrument<R, S, B>(&self, op: OpKind, site: S, payload: Option<Payload>, body: B) -> R
    where
        S: FnOnce() -> CallSite,
        B: FnOnce(&Execution<'_>) -> R,
    {
        self.instrument_with_outcome(op, site, payload, body).0
    }

    /// Like [`instrument`](Self::instrument), also reporting how the call
    /// was classified (`None` when disabled)
    pub fn instrument_with_outcome<R, S, B>(
        &self,
        op: OpKind,
        site: S,
        payload: Option<Payload>,
        body: B,
    ) -> (R, Option<Completion>)
    where
        S: FnOnce() -> CallSite,
        B: FnOnce(&Execution<'_>) -> R,
    {
        let Some(threshold) = self.threshold else {
            return (body(&Execution::detached()), None);
        };

        let started = Instant::now();
        let record = InFlight {
            monitor: self,
            op,
            site: site(),
            started,
            threshold,
            payload,
            began: Cell::new(false),
            claim: Cell::new(None),
            claim_id: Arc::new(AtomicU64::new(0)),
        };
        let mut guard = CompletionGuard {
            watchdog: Some(self.arm(&record)),
            record: &record,
            outcome: None,
        };

        let result = body(&Execution {
            record: Some(&record),
        });
        let outcome = guard.complete();
        (result, Some(outcome))
    }

    fn arm(&self, record: &InFlight<'_>) -> WatchdogHandle {
        let op = record.op;
        let site = record.site.clone();
        let threshold = record.threshold;
        let own_claim = Arc::clone(&record.claim_id);
        let registry = Arc::clone(&self.registry);
        let on_slow = self.on_slow.clone();
        let sink = Arc::clone(&self.sink);

        self.watchdog.arm(record.started, threshold, move || {
            if let Some(on_slow) = on_slow {
                on_slow(op, &site);
                return;
            }
            let holder = if op.is_exclusive() {
                registry
                    .peek()
                    .filter(|h| h.claim_id() != own_claim.load(Ordering::Acquire))
                    .map(|h| Blame::from_holder(&h))
            } else {
                None
            };
            sink.emit(&Diagnostic::Stuck {
                op,
                site,
                threshold,
                holder,
            });
        })
    }
}

impl Default for SlowMonitor {
    fn default() -> Self {
        Self::new(SlowThreshold::Default)
    }
}

impl fmt::Debug for SlowMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlowMonitor")
            .field("threshold", &self.threshold)
            .field("registry", &self.registry)
            .field("watchdog", &self.watchdog)
            .field("on_slow", &self.on_slow.is_some())
            .finish()
    }
}

/// One in-flight operation record
struct InFlight<'m> {
    monitor: &'m SlowMonitor,
    op: OpKind,
    site: CallSite,
    started: Instant,
    threshold: Duration,
    payload: Option<Payload>,
    began: Cell<bool>,
    claim: Cell<Option<ClaimToken>>,
    // Mirrors `claim` for the watchdog thread; 0 means never claimed.
    // Claim ids are never reused, so a stale id cannot match another holder.
    claim_id: Arc<AtomicU64>,
}

/// Signal handed to the instrumented body
///
/// Call [`begin`](Self::begin) from inside the store's own closure, once the
/// store lock is held.
pub struct Execution<'a> {
    record: Option<&'a InFlight<'a>>,
}

impl Execution<'_> {
    /// Execution that is not being monitored
    pub fn detached() -> Self {
        Execution { record: None }
    }

    /// Mark the user function as started
    ///
    /// For writes this claims the attribution registry if it is empty.
    /// Only the first call has any effect.
    pub fn begin(&self) {
        let Some(record) = self.record else {
            return;
        };
        if record.began.replace(true) || !record.op.is_exclusive() {
            return;
        }

        let registry = &record.monitor.registry;
        if let ClaimOutcome::Claimed(token) =
            registry.claim_if_empty(record.site.clone(), record.payload.clone())
        {
            record.claim_id.store(token.id(), Ordering::Release);
            record.claim.set(Some(token));
        }
    }

    /// Whether this execution is being monitored
    pub fn is_monitored(&self) -> bool {
        self.record.is_some()
    }

    /// Whether this execution holds the attribution slot
    pub fn holds_claim(&self) -> bool {
        self.record
            .map(|r| r.claim_id.load(Ordering::Acquire) != 0)
            .unwrap_or(false)
    }
}

/// Runs completion exactly once, on return or on unwind
struct CompletionGuard<'a> {
    record: &'a InFlight<'a>,
    watchdog: Option<WatchdogHandle>,
    outcome: Option<Completion>,
}

impl CompletionGuard<'_> {
    fn complete(&mut self) -> Completion {
        if let Some(outcome) = self.outcome {
            return outcome;
        }

        if let Some(mut watchdog) = self.watchdog.take() {
            watchdog.disarm();
        }

        let record = self.record;
        let registry = &record.monitor.registry;
        let elapsed = record.started.elapsed();
        let own_claim = record.claim.take();

        let outcome = if elapsed <= record.threshold {
            if let Some(token) = own_claim {
                registry.release(token);
            }
            Completion::Fast
        } else if let Some(token) = own_claim {
            registry.release(token);
            record.monitor.sink.emit(&Diagnostic::Slowest {
                op: record.op,
                elapsed,
                site: record.site.clone(),
                payload: record.payload.clone(),
            });
            Completion::SlowSelf
        } else {
            let holder = if record.op.is_exclusive() {
                registry.peek()
            } else {
                None
            };
            match holder {
                Some(holder) => {
                    record.monitor.sink.emit(&Diagnostic::Blocked {
                        op: record.op,
                        elapsed,
                        site: record.site.clone(),
                        holder: Blame::from_holder(&holder),
                    });
                    Completion::SlowBlocked
                }
                None => {
                    record.monitor.sink.emit(&Diagnostic::Unattributed {
                        op: record.op,
                        elapsed,
                        site: record.site.clone(),
                    });
                    Completion::SlowUnattributed
                }
            }
        };

        self.outcome = Some(outcome);
        outcome
    }
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.complete();
    }
}
