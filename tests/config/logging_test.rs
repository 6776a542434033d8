//! Tests for `src/logging.rs`.
//!
//! A global subscriber can be installed once per process, so production
//! init is exercised by a single test.

use radarwatch::logging::{init_cli, init_production};

#[test]
fn production_init_creates_log_dir_and_returns_guard() {
    let dir = tempfile::tempdir().expect("tempdir");
    let logs = dir.path().join("nested").join("logs");

    let guard = init_production(&logs, "info").expect("first init succeeds");
    assert!(logs.is_dir());

    tracing::info!(probe = true, "logging test event");
    drop(guard);

    // A subscriber is now installed; CLI init must quietly do nothing.
    init_cli("warn");
}
