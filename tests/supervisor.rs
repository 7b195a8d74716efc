//! End-to-end supervisor tests with real processes.
//!
//! These spawn `/bin/sh` and `/bin/sleep` and observe ordering through
//! marker files written by the supervised scripts themselves.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use procwatch::{ConfigError, NullLogSink, Supervisor};
use tokio::time::{sleep, timeout};

fn supervisor() -> Supervisor {
    Supervisor::new(Arc::new(NullLogSink))
}

/// Read a `date +%s%N` timestamp a supervised script wrote.
fn read_stamp(path: &Path) -> u128 {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("missing marker {}: {e}", path.display()))
        .trim()
        .parse()
        .expect("marker holds a nanosecond timestamp")
}

#[tokio::test]
async fn dependent_launches_only_after_dependency_starts() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("web-launched");

    let mut sup = supervisor();
    sup.add_service("db", "/bin/sleep").unwrap().arg("30");
    sup.add_service("web", "/bin/sh")
        .unwrap()
        .arg("-c")
        .arg(format!("echo up > {}; exec sleep 30", marker.display()))
        .add_dependency("db");

    let handle = sup.shutdown_handle();
    let driver = tokio::spawn(sup.run());

    sleep(Duration::from_secs(1)).await;
    assert!(marker.exists(), "dependent must launch once the dependency is up");

    // Two concurrent shutdown requests collapse into one stop sequence
    // and run() still returns exactly once.
    handle.shutdown();
    handle.shutdown();
    timeout(Duration::from_secs(20), driver)
        .await
        .expect("run must return after shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn dependent_never_launches_while_dependency_keeps_failing() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("web-launched");

    let mut sup = supervisor();
    // Fails on every attempt, so its "started" signal never fires.
    sup.add_service("db", "/bin/false").unwrap();
    sup.add_service("web", "/bin/sh")
        .unwrap()
        .arg("-c")
        .arg(format!("echo up > {}; exec sleep 30", marker.display()))
        .add_dependency("db");

    let handle = sup.shutdown_handle();
    let driver = tokio::spawn(sup.run());

    sleep(Duration::from_secs(1)).await;
    assert!(
        !marker.exists(),
        "dependent must not launch before a successful dependency start"
    );

    handle.shutdown();
    timeout(Duration::from_secs(20), driver)
        .await
        .expect("run must return after shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn dependency_outlives_its_dependents_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let db_term = dir.path().join("db-term");
    let web_exit = dir.path().join("web-exit");

    let mut sup = supervisor();
    // Records when it receives TERM, then exits cleanly.
    sup.add_service("db", "/bin/sh").unwrap().arg("-c").arg(format!(
        "trap 'date +%s%N > {}; exit 0' TERM; while :; do sleep 0.1; done",
        db_term.display()
    ));
    // Takes half a second to die after TERM, recording when it is done.
    sup.add_service("web", "/bin/sh")
        .unwrap()
        .arg("-c")
        .arg(format!(
            "trap 'sleep 0.5; date +%s%N > {}; exit 0' TERM; while :; do sleep 0.1; done",
            web_exit.display()
        ))
        .add_dependency("db");

    let handle = sup.shutdown_handle();
    let driver = tokio::spawn(sup.run());

    sleep(Duration::from_secs(1)).await;
    handle.shutdown();
    timeout(Duration::from_secs(20), driver)
        .await
        .expect("run must return after shutdown")
        .unwrap()
        .unwrap();

    // db's TERM must postdate web's full exit, slow trap included.
    assert!(
        read_stamp(&db_term) >= read_stamp(&web_exit),
        "db was terminated before its dependent finished stopping"
    );
}

#[tokio::test]
async fn term_ignoring_service_is_killed_after_grace_period() {
    let mut sup = supervisor();
    sup.add_service("stubborn", "/bin/sh")
        .unwrap()
        .arg("-c")
        .arg("trap '' TERM; sleep 30")
        .set_term_timeout(Duration::from_millis(500));

    let handle = sup.shutdown_handle();
    let driver = tokio::spawn(sup.run());

    sleep(Duration::from_millis(700)).await;
    let begin = Instant::now();
    handle.shutdown();
    timeout(Duration::from_secs(10), driver)
        .await
        .expect("kill escalation must unblock shutdown")
        .unwrap()
        .unwrap();
    // Grace period was respected before the kill.
    assert!(begin.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn resolution_failure_launches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("launched");

    let mut sup = supervisor();
    sup.add_service("web", "/bin/sh")
        .unwrap()
        .arg("-c")
        .arg(format!("echo up > {}", marker.display()))
        .add_dependency("missing");

    assert!(matches!(
        sup.run().await,
        Err(ConfigError::UnknownDependency { .. })
    ));
    sleep(Duration::from_millis(300)).await;
    assert!(!marker.exists(), "no process may launch when resolution fails");
}
