//! Lock-holder attribution registry
//!
//! A single slot recording which write call currently holds the store's
//! write lock, so that a slow call can blame the holder.
//!
//! # Discipline
//!
//! - Claims and releases take the write lock; peeks take the read lock.
//! - Critical sections only copy fields. Logging and callbacks always
//!   happen after the guard is dropped.
//! - First claim wins. A claim attempt while occupied returns the current
//!   holder and leaves it untouched.
//! - Only the claiming call instance can release, identified by the
//!   [`ClaimToken`] it received. The same call site entered twice gets two
//!   distinct tokens.
//!
//! One registry belongs to one database handle; nothing here is global.

use parking_lot::RwLock;
use slowdb_core::{CallSite, Payload};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// The call currently attributed with the write lock
#[derive(Clone)]
pub struct Holder {
    site: CallSite,
    since: Instant,
    payload: Option<Payload>,
    claim: u64,
}

impl Holder {
    /// Call site of the holder
    pub fn site(&self) -> &CallSite {
        &self.site
    }

    /// When the holder claimed the slot
    pub fn since(&self) -> Instant {
        self.since
    }

    /// How long the slot has been held as of now
    pub fn held_for(&self) -> Duration {
        self.since.elapsed()
    }

    /// Payload attached by the holder, if any
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Id of the claim that produced this holder
    pub fn claim_id(&self) -> u64 {
        self.claim
    }
}

impl fmt::Debug for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Holder")
            .field("site", &self.site)
            .field("held_for", &self.held_for())
            .field("payload", &self.payload)
            .field("claim", &self.claim)
            .finish()
    }
}

/// Proof of a successful claim, required to release it
#[must_use = "a claim that is never released keeps the slot occupied"]
#[derive(Debug, PartialEq, Eq)]
pub struct ClaimToken {
    id: u64,
}

impl ClaimToken {
    /// Unique id of this claim within its registry
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Result of [`AttributionRegistry::claim_if_empty`]
#[derive(Debug)]
pub enum ClaimOutcome {
    /// Slot was empty and is now held by the caller
    Claimed(ClaimToken),
    /// Slot is held by someone else
    Occupied(Holder),
}

impl ClaimOutcome {
    /// Whether the caller now holds the slot
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed(_))
    }
}

/// Single-slot registry of the current write-lock holder
#[derive(Debug, Default)]
pub struct AttributionRegistry {
    slot: RwLock<Option<Holder>>,
    next_claim: AtomicU64,
}

impl AttributionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill the slot if it is empty
    ///
    /// Returns `Claimed` with a token when the slot was empty; otherwise
    /// `Occupied` with a snapshot of the existing holder.
    pub fn claim_if_empty(&self, site: CallSite, payload: Option<Payload>) -> ClaimOutcome {
        let mut slot = self.slot.write();
        if let Some(holder) = slot.as_ref() {
            return ClaimOutcome::Occupied(holder.clone());
        }

        let id = self.next_claim.fetch_add(1, Ordering::Relaxed) + 1;
        *slot = Some(Holder {
            site,
            since: Instant::now(),
            payload,
            claim: id,
        });
        ClaimOutcome::Claimed(ClaimToken { id })
    }

    /// Clear the slot if it is still held by this claim
    ///
    /// Returns whether the slot was cleared. A token that does not match
    /// the current holder is a no-op.
    pub fn release(&self, token: ClaimToken) -> bool {
        let mut slot = self.slot.write();
        match slot.as_ref() {
            Some(holder) if holder.claim == token.id => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the current holder
    pub fn peek(&self) -> Option<Holder> {
        self.slot.read().clone()
    }

    /// Check if no call holds the slot
    pub fn is_empty(&self) -> bool {
        self.slot.read().is_none()
    }
}
