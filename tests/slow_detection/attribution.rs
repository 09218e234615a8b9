//! Attribution Tests
//!
//! Who gets blamed when a write is slow.

use crate::common::*;
use slowdb::ClaimOutcome;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// ============================================================================
// Self attribution
// ============================================================================

#[test]
fn slow_write_without_contender_is_slowest() {
    let (db, sink) = recording_db(Duration::from_secs(1));

    let line = line!() + 1;
    db.update(hold(Duration::from_secs(2))).unwrap();

    let slowest = sink.of_kind("slowest");
    assert_eq!(slowest.len(), 1);
    let d = &slowest[0];
    assert_eq!(d.site().line(), line);
    assert!(d.site().file().ends_with("attribution.rs"));
    assert!(d.elapsed() >= Duration::from_secs(2));
    assert!(d.elapsed() < Duration::from_secs(3));
    assert!(db.monitor().registry().is_empty());
}

#[test]
fn slowest_line_carries_payload() {
    let (db, sink) = recording_db(Duration::from_millis(100));

    db.update_with_data(("import", 42), hold(Duration::from_millis(250)))
        .unwrap();

    let lines = sink.lines();
    let slowest = lines.iter().find(|l| l.starts_with("SLOWEST")).unwrap();
    assert!(slowest.ends_with("data:(\"import\", 42)"), "{}", slowest);
}

// ============================================================================
// Blame attribution
// ============================================================================

#[test]
fn blocked_write_names_the_holder() {
    let (db, sink) = overlapping_db(Duration::from_secs(1));
    let db = Arc::new(db);
    let a_started = Arc::new(Barrier::new(2));

    let a_line = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let a = thread::spawn({
        let db = Arc::clone(&db);
        let a_started = Arc::clone(&a_started);
        let a_line = Arc::clone(&a_line);
        move || {
            a_line.store(line!() + 1, std::sync::atomic::Ordering::SeqCst);
            db.update_with_data("batch-A", |_tx| {
                a_started.wait();
                thread::sleep(Duration::from_secs(2));
                Ok::<_, Error>(())
            })
        }
    });

    a_started.wait();
    thread::sleep(Duration::from_millis(200));
    db.update(hold(Duration::from_millis(1200))).unwrap();

    // B finished at ~1.4s while A is still inside its transaction.
    let blocked = sink.of_kind("blocked");
    assert_eq!(blocked.len(), 1, "diagnostics: {:?}", sink.lines());
    let blame = blocked[0].blame().unwrap();
    assert_eq!(
        blame.site.line(),
        a_line.load(std::sync::atomic::Ordering::SeqCst)
    );
    assert!(blame.held_for >= Duration::from_millis(1200));
    assert!(blame.held_for < Duration::from_secs(2));
    assert_eq!(format!("{:?}", blame.payload.as_ref().unwrap()), "\"batch-A\"");

    let line = sink
        .lines()
        .into_iter()
        .find(|l| l.starts_with("[Update] took "))
        .unwrap();
    assert!(line.contains(", lock held by "));
    assert!(line.ends_with("data:\"batch-A\""));

    a.join().unwrap().unwrap();
    assert_eq!(sink.of_kind("slowest").len(), 1);
    assert!(db.monitor().registry().is_empty());
}

#[test]
fn stuck_report_names_the_holder() {
    let (db, sink) = overlapping_db(Duration::from_millis(150));
    let db = Arc::new(db);
    let a_started = Arc::new(Barrier::new(2));

    let a = thread::spawn({
        let db = Arc::clone(&db);
        let a_started = Arc::clone(&a_started);
        move || {
            db.update(|_tx| {
                a_started.wait();
                thread::sleep(Duration::from_millis(600));
                Ok::<_, Error>(())
            })
        }
    });

    a_started.wait();
    db.update(hold(Duration::from_millis(300))).unwrap();
    a.join().unwrap().unwrap();

    let stuck = sink.of_kind("stuck");
    assert_eq!(stuck.len(), 2);
    // A's own watchdog does not blame A; B's does.
    assert_eq!(stuck.iter().filter(|d| d.blame().is_some()).count(), 1);
}

#[test]
fn reads_never_blame() {
    let (db, sink) = overlapping_db(Duration::from_millis(100));
    let db = Arc::new(db);
    let a_started = Arc::new(Barrier::new(2));

    let a = thread::spawn({
        let db = Arc::clone(&db);
        let a_started = Arc::clone(&a_started);
        move || {
            db.update(|_tx| {
                a_started.wait();
                thread::sleep(Duration::from_millis(500));
                Ok::<_, Error>(())
            })
        }
    });

    a_started.wait();
    db.view(|_tx| {
        thread::sleep(Duration::from_millis(250));
        Ok::<_, Error>(())
    })
    .unwrap();

    let read_reports: Vec<Diagnostic> = sink
        .of_kind("unattributed")
        .into_iter()
        .filter(|d| d.op() == OpKind::Read)
        .collect();
    assert_eq!(read_reports.len(), 1);
    assert!(sink
        .of_kind("stuck")
        .iter()
        .filter(|d| d.op() == OpKind::Read)
        .all(|d| d.blame().is_none()));

    a.join().unwrap().unwrap();
}

// ============================================================================
// Registry exclusivity
// ============================================================================

#[test]
fn concurrent_claims_keep_first_holder() {
    let registry = Arc::new(AttributionRegistry::new());
    let first = registry.claim_if_empty(CallSite::new("first", "a.rs", 1), None);
    let ClaimOutcome::Claimed(token) = first else {
        panic!("first claim must succeed");
    };

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                match registry.claim_if_empty(CallSite::new("late", "b.rs", i), None) {
                    ClaimOutcome::Occupied(holder) => holder.site().function() == Some("first"),
                    ClaimOutcome::Claimed(_) => false,
                }
            })
        })
        .collect();

    for h in handles {
        assert!(h.join().unwrap());
    }
    assert!(registry.release(token));
    assert!(registry.is_empty());
}

#[test]
fn registries_are_per_database() {
    let (slow_db, _) = overlapping_db(Duration::from_secs(5));
    let (other_db, _) = overlapping_db(Duration::from_secs(5));

    slow_db
        .update(|_tx| {
            assert!(!slow_db.monitor().registry().is_empty());
            assert!(other_db.monitor().registry().is_empty());
            Ok::<_, Error>(())
        })
        .unwrap();
}
