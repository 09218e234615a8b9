//! Slow-call diagnostics and where they go
//!
//! A [`Diagnostic`] is built after every registry guard has been dropped and
//! then handed to a [`DiagnosticSink`]. The default sink, [`TracingSink`],
//! logs each one as a `warn!` on target `slowdb::slow`.
//!
//! # Line formats
//!
//! ```text
//! [Update] stuck, called by FN (FILE:LINE)[, lock held by HOLDER for HELD[, data:PAYLOAD]]
//! SLOWEST Update took DUR, called by FN (FILE:LINE)[, data:PAYLOAD]
//! [Update] took DUR, called by FN (FILE:LINE), lock held by HOLDER for HELD[, data:PAYLOAD]
//! [View] took DUR, called by FN (FILE:LINE)
//! ```

use crate::attribution::Holder;
use slowdb_core::{format_duration, CallSite, OpKind, Payload};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Log target used by [`TracingSink`]
pub const SLOW_LOG_TARGET: &str = "slowdb::slow";

/// User hook that replaces the default "stuck" diagnostic
pub type SlowCallback = Arc<dyn Fn(OpKind, &CallSite) + Send + Sync>;

/// Snapshot of another call's claim, captured when a diagnostic is built
#[derive(Debug, Clone)]
pub struct Blame {
    /// Call site of the lock holder
    pub site: CallSite,
    /// How long the holder had the lock at capture time
    pub held_for: Duration,
    /// Payload the holder attached, if any
    pub payload: Option<Payload>,
}

impl Blame {
    /// Capture a holder as of now
    pub fn from_holder(holder: &Holder) -> Self {
        Self {
            site: holder.site().clone(),
            held_for: holder.held_for(),
            payload: holder.payload().cloned(),
        }
    }
}

impl fmt::Display for Blame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lock held by {} for {}",
            self.site,
            format_duration(self.held_for)
        )?;
        if let Some(payload) = &self.payload {
            write!(f, ", data:{:?}", payload)?;
        }
        Ok(())
    }
}

/// One slow-call report
#[derive(Debug, Clone)]
pub enum Diagnostic {
    /// The watchdog fired while the call was still in flight
    Stuck {
        /// Operation kind
        op: OpKind,
        /// Call site of the stuck call
        site: CallSite,
        /// Threshold that was crossed
        threshold: Duration,
        /// Current lock holder, write operations only
        holder: Option<Blame>,
    },
    /// The call itself held the lock while it was slow
    Slowest {
        /// Operation kind
        op: OpKind,
        /// Time since call entry
        elapsed: Duration,
        /// Call site of the slow call
        site: CallSite,
        /// Payload the call attached, if any
        payload: Option<Payload>,
    },
    /// The call was slow while another call held the lock
    Blocked {
        /// Operation kind
        op: OpKind,
        /// Time since call entry
        elapsed: Duration,
        /// Call site of the slow call
        site: CallSite,
        /// The call that held the lock
        holder: Blame,
    },
    /// The call was slow and no holder is known
    Unattributed {
        /// Operation kind
        op: OpKind,
        /// Time since call entry
        elapsed: Duration,
        /// Call site of the slow call
        site: CallSite,
    },
}

impl Diagnostic {
    /// Operation kind of the reporting call
    pub fn op(&self) -> OpKind {
        match self {
            Diagnostic::Stuck { op, .. }
            | Diagnostic::Slowest { op, .. }
            | Diagnostic::Blocked { op, .. }
            | Diagnostic::Unattributed { op, .. } => *op,
        }
    }

    /// Call site of the reporting call
    pub fn site(&self) -> &CallSite {
        match self {
            Diagnostic::Stuck { site, .. }
            | Diagnostic::Slowest { site, .. }
            | Diagnostic::Blocked { site, .. }
            | Diagnostic::Unattributed { site, .. } => site,
        }
    }

    /// Elapsed time at completion, or the threshold for a stuck report
    pub fn elapsed(&self) -> Duration {
        match self {
            Diagnostic::Stuck { threshold, .. } => *threshold,
            Diagnostic::Slowest { elapsed, .. }
            | Diagnostic::Blocked { elapsed, .. }
            | Diagnostic::Unattributed { elapsed, .. } => *elapsed,
        }
    }

    /// Short kind name, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::Stuck { .. } => "stuck",
            Diagnostic::Slowest { .. } => "slowest",
            Diagnostic::Blocked { .. } => "blocked",
            Diagnostic::Unattributed { .. } => "unattributed",
        }
    }

    /// The other call blamed by this report, if any
    pub fn blame(&self) -> Option<&Blame> {
        match self {
            Diagnostic::Stuck { holder, .. } => holder.as_ref(),
            Diagnostic::Blocked { holder, .. } => Some(holder),
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Stuck {
                op, site, holder, ..
            } => {
                write!(f, "[{}] stuck, called by {}", op, site)?;
                if let Some(holder) = holder {
                    write!(f, ", {}", holder)?;
                }
                Ok(())
            }
            Diagnostic::Slowest {
                op,
                elapsed,
                site,
                payload,
            } => {
                write!(
                    f,
                    "SLOWEST {} took {}, called by {}",
                    op,
                    format_duration(*elapsed),
                    site
                )?;
                if let Some(payload) = payload {
                    write!(f, ", data:{:?}", payload)?;
                }
                Ok(())
            }
            Diagnostic::Blocked {
                op,
                elapsed,
                site,
                holder,
            } => write!(
                f,
                "[{}] took {}, called by {}, {}",
                op,
                format_duration(*elapsed),
                site,
                holder
            ),
            Diagnostic::Unattributed { op, elapsed, site } => write!(
                f,
                "[{}] took {}, called by {}",
                op,
                format_duration(*elapsed),
                site
            ),
        }
    }
}

/// Destination for slow-call diagnostics
///
/// Invoked outside every registry lock, possibly from a watchdog thread.
pub trait DiagnosticSink: Send + Sync {
    /// Deliver one diagnostic
    fn emit(&self, diagnostic: &Diagnostic);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&Diagnostic) + Send + Sync,
{
    fn emit(&self, diagnostic: &Diagnostic) {
        self(diagnostic)
    }
}

/// Default sink: one `warn!` per diagnostic on [`SLOW_LOG_TARGET`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        let site = diagnostic.site();
        let holder = diagnostic.blame().map(|b| b.site.to_string());
        warn!(
            target: SLOW_LOG_TARGET,
            kind = diagnostic.kind(),
            op = diagnostic.op().as_str(),
            elapsed_ms = diagnostic.elapsed().as_millis() as u64,
            function = site.function(),
            file = site.file(),
            line = site.line(),
            holder = holder.as_deref(),
            "{}",
            diagnostic
        );
    }
}
