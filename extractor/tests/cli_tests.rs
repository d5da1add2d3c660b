//! CLI process-level tests.

use std::process::Command;

#[test]
fn fatal_startup_error_is_reported_on_stderr() {
    // Invalid engine settings fail before telemetry init; the error must
    // still reach the user rather than vanish into an uninitialized
    // subscriber.
    let output = Command::new(env!("CARGO_BIN_EXE_extractor"))
        .env("EXTRACTOR__HTTP__REQUEST_TIMEOUT_SECS", "0")
        .args(["sync", "--config", "/nonexistent.json"])
        .output()
        .expect("binary runs");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("request_timeout_secs"),
        "stderr was: {}",
        stderr
    );
}

#[test]
fn missing_connector_config_is_reported_on_stderr() {
    let output = Command::new(env!("CARGO_BIN_EXE_extractor"))
        .args(["sync", "--config", "/nonexistent.json"])
        .output()
        .expect("binary runs");

    assert!(!output.status.success());
    assert!(!output.stderr.is_empty());
}
