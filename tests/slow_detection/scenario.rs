//! Reference scenario: one-second threshold, one slow and one quick write.

use crate::common::*;
use std::thread;
use std::time::Duration;

#[test]
fn two_second_write_logs_one_slowest_line() {
    let log = CapturedLog::new();
    let _guard = log.install();
    let db = Database::builder()
        .ephemeral()
        .slow_threshold(Duration::from_secs(1))
        .open()
        .unwrap();

    db.update(|_tx| {
        thread::sleep(Duration::from_secs(2));
        Ok::<_, Error>(())
    })
    .unwrap();

    let slowest: Vec<String> = log
        .lines()
        .into_iter()
        .filter(|l| l.contains("SLOWEST"))
        .collect();
    assert_eq!(slowest.len(), 1, "log was:\n{}", log.contents());
    assert!(slowest[0].contains("SLOWEST Update took 2."));
    assert!(slowest[0].contains("scenario.rs:"));
}

#[test]
fn half_second_write_logs_nothing() {
    let log = CapturedLog::new();
    let _guard = log.install();
    let db = Database::builder()
        .ephemeral()
        .slow_threshold(Duration::from_secs(1))
        .open()
        .unwrap();

    db.update(|_tx| {
        thread::sleep(Duration::from_millis(500));
        Ok::<_, Error>(())
    })
    .unwrap();

    assert!(log.contents().is_empty(), "log was:\n{}", log.contents());
    assert!(db.monitor().registry().is_empty());
}
