//! Logging Tests
//!
//! Default `tracing` output and call-site resolution.

use crate::common::*;
use slowdb::{BacktraceResolver, CallSiteResolver, SLOW_LOG_TARGET};
use std::panic::Location;
use std::thread;
use std::time::Duration;

#[test]
fn stuck_and_slowest_go_to_the_slow_target() {
    let log = CapturedLog::new();
    let _guard = log.install();
    let db = Database::builder()
        .ephemeral()
        .slow_threshold(Duration::from_millis(50))
        .open()
        .unwrap();

    db.update(hold(Duration::from_millis(150))).unwrap();

    let lines = log.lines();
    assert_eq!(lines.len(), 2, "log was:\n{}", log.contents());
    // The stuck line comes from the watchdog thread, on the caller's subscriber.
    assert!(lines[0].contains("WARN"));
    assert!(lines[0].contains(SLOW_LOG_TARGET));
    assert!(lines[0].contains("[Update] stuck, called by "));
    assert!(lines[0].contains("logging.rs:"));
    assert!(lines[1].contains("SLOWEST Update took "));
    assert!(lines[1].contains("kind=\"slowest\"") || lines[1].contains("kind=slowest"));
    assert!(lines[1].contains("elapsed_ms="));
}

#[test]
fn slow_read_logs_view() {
    let log = CapturedLog::new();
    let _guard = log.install();
    let db = Database::builder()
        .ephemeral()
        .slow_threshold(Duration::from_millis(30))
        .open()
        .unwrap();

    db.view(|_tx| {
        thread::sleep(Duration::from_millis(90));
        Ok::<_, Error>(())
    })
    .unwrap();

    let contents = log.contents();
    assert!(contents.contains("[View] stuck, called by "));
    assert!(contents.contains("[View] took "));
    assert!(!contents.contains("SLOWEST"));
    assert!(!contents.contains("lock held by"));
}

#[test]
fn custom_resolver_names_the_function() {
    let sink = RecordingSink::new();
    let db = Database::builder()
        .ephemeral()
        .slow_threshold(Duration::from_millis(20))
        .resolver(|caller: &'static Location<'static>| {
            CallSite::from_location(caller).with_function("jobs::nightly_import")
        })
        .diagnostic_sink(sink.clone())
        .open()
        .unwrap();

    db.update(hold(Duration::from_millis(60))).unwrap();

    let lines = sink.lines();
    assert!(lines
        .iter()
        .any(|l| l.starts_with("SLOWEST Update took ")
            && l.contains("called by jobs::nightly_import (")));
}

#[test]
fn backtrace_resolver_keeps_the_location() {
    #[track_caller]
    fn resolve_here() -> CallSite {
        BacktraceResolver.resolve(Location::caller())
    }

    let line = line!() + 1;
    let site = resolve_here();
    assert_eq!(site.line(), line);
    assert!(site.file().ends_with("logging.rs"));
    let function = site.function().expect("function name");
    assert!(function.contains("backtrace_resolver_keeps_the_location"));
}

#[test]
fn default_database_names_the_calling_function() {
    let sink = RecordingSink::new();
    let db = Database::builder()
        .ephemeral()
        .slow_threshold(Duration::from_millis(20))
        .diagnostic_sink(sink.clone())
        .open()
        .unwrap();

    db.update(hold(Duration::from_millis(60))).unwrap();

    let slowest = sink.of_kind("slowest");
    assert_eq!(slowest.len(), 1);
    let function = slowest[0].site().function().expect("function name");
    assert!(function.ends_with("default_database_names_the_calling_function"));

    let line = sink
        .lines()
        .into_iter()
        .find(|l| l.starts_with("SLOWEST"))
        .unwrap();
    assert!(line.contains("default_database_names_the_calling_function (tests/"));
}

#[test]
fn function_names_can_be_turned_off_from_config() {
    let config = DatabaseConfig::from_toml_str(
        r#"
        [slow]
        threshold = "20ms"
        resolve_function_names = false
        "#,
    )
    .unwrap();
    let sink = RecordingSink::new();
    let db = Database::builder()
        .config(config)
        .ephemeral()
        .diagnostic_sink(sink.clone())
        .open()
        .unwrap();

    let line = line!() + 1;
    db.update(hold(Duration::from_millis(60))).unwrap();

    let slowest = sink.of_kind("slowest");
    assert_eq!(slowest.len(), 1);
    assert_eq!(slowest[0].site().line(), line);
    assert_eq!(slowest[0].site().function(), None);
}
