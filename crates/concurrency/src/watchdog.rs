//! One-shot cancellable watchdog
//!
//! `Watchdog::arm` starts a background monitor that sleeps until a deadline
//! and then runs a callback, unless the returned handle is disarmed first.
//!
//! # Protocol
//!
//! ```text
//! monitor thread                      caller
//! --------------                      ------
//! lock state                          ...user work...
//! while Armed: wait_until(deadline)
//!                                     disarm():
//!                                       lock state
//!                                       Armed -> Disarmed, notify
//!                                       unlock, return
//! Armed at deadline -> Fired
//! unlock, run callback
//! exit (active -= 1)
//! ```
//!
//! The state transition out of `Armed` happens under one lock, so exactly
//! one side wins: either the caller disarms first and the callback never
//! runs, or the monitor marks `Fired` first and the callback runs once.
//! Disarm never waits for the monitor. A disarmed monitor wakes and exits
//! by itself; a fired one exits when its callback returns. Until then it
//! still counts in [`Watchdog::active_monitors`].

use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

const MONITOR_THREAD_NAME: &str = "slowdb-watchdog";
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriggerState {
    Armed,
    Disarmed,
    Fired,
}

#[derive(Debug)]
struct Trigger {
    state: Mutex<TriggerState>,
    wake: Condvar,
}

impl Trigger {
    fn new() -> Self {
        Self {
            state: Mutex::new(TriggerState::Armed),
            wake: Condvar::new(),
        }
    }

    /// Block until disarmed or the deadline passes; true if we should fire
    fn wait(&self, deadline: Option<Instant>) -> bool {
        let mut state = self.state.lock();
        while *state == TriggerState::Armed {
            match deadline {
                Some(deadline) => {
                    if self.wake.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.wake.wait(&mut state),
            }
        }
        if *state == TriggerState::Armed {
            *state = TriggerState::Fired;
            true
        } else {
            false
        }
    }

    /// Returns whether the trigger had already fired
    fn disarm(&self) -> bool {
        let mut state = self.state.lock();
        if *state == TriggerState::Armed {
            *state = TriggerState::Disarmed;
            self.wake.notify_one();
        }
        *state == TriggerState::Fired
    }

    fn fired(&self) -> bool {
        *self.state.lock() == TriggerState::Fired
    }
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    armed: AtomicU64,
    fired: AtomicU64,
}

/// Decrements the active count when the monitor exits, even by panic.
struct ActiveMonitor(Arc<Counters>);

impl Drop for ActiveMonitor {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Factory for watchdog handles
///
/// Clones share counters, which makes monitor leaks observable.
#[derive(Debug, Clone, Default)]
pub struct Watchdog {
    counters: Arc<Counters>,
}

impl Watchdog {
    /// Create a watchdog with zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot trigger
    ///
    /// `on_fire` runs on a detached background thread no earlier than
    /// `started + threshold`, unless the handle is disarmed first. The
    /// caller's `tracing` dispatcher is installed on that thread.
    ///
    /// If the monitor thread cannot be spawned, a warning is logged and the
    /// returned handle is inert.
    pub fn arm<F>(&self, started: Instant, threshold: Duration, on_fire: F) -> WatchdogHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = started.checked_add(threshold);
        let trigger = Arc::new(Trigger::new());
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());

        self.counters.armed.fetch_add(1, Ordering::Relaxed);
        self.counters.active.fetch_add(1, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name(MONITOR_THREAD_NAME.to_string())
            .spawn({
                let trigger = Arc::clone(&trigger);
                let counters = Arc::clone(&self.counters);
                move || {
                    let _active = ActiveMonitor(Arc::clone(&counters));
                    if trigger.wait(deadline) {
                        counters.fired.fetch_add(1, Ordering::Relaxed);
                        tracing::dispatcher::with_default(&dispatch, || {
                            if panic::catch_unwind(AssertUnwindSafe(on_fire)).is_err() {
                                warn!("watchdog callback panicked");
                            }
                        });
                    }
                }
            });

        // The join handle is dropped; the monitor is never waited on.
        if let Err(e) = spawned {
            self.counters.active.fetch_sub(1, Ordering::SeqCst);
            trigger.disarm();
            warn!(error = %e, "failed to spawn watchdog monitor, continuing without it");
        }
        WatchdogHandle { trigger }
    }

    /// Monitors that have been armed and not yet exited
    pub fn active_monitors(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Total number of handles ever armed
    pub fn armed_total(&self) -> u64 {
        self.counters.armed.load(Ordering::Relaxed)
    }

    /// Total number of triggers that fired
    pub fn fired_total(&self) -> u64 {
        self.counters.fired.load(Ordering::Relaxed)
    }

    /// Poll until every monitor has exited or `timeout` passes
    ///
    /// Returns whether the watchdog went idle. Meant for tests and shutdown
    /// paths; instrumented calls never wait on monitors.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.active_monitors() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL_INTERVAL);
        }
    }
}

/// One armed trigger
///
/// Dropping the handle disarms it.
#[derive(Debug)]
pub struct WatchdogHandle {
    trigger: Arc<Trigger>,
}

impl WatchdogHandle {
    /// Stop the trigger without waiting for the monitor
    ///
    /// Idempotent. Returns whether the trigger had fired; if so its
    /// callback may still be running on the monitor thread.
    pub fn disarm(&mut self) -> bool {
        self.trigger.disarm()
    }

    /// Whether the trigger has fired so far
    pub fn has_fired(&self) -> bool {
        self.trigger.fired()
    }
}

impl Drop for WatchdogHandle {
    fn drop(&mut self) {
        self.disarm();
    }
}
