//! CLI smoke tests for `--mode` dispatch and config-file loading. These only
//! exercise the parts of `main` that don't require an actual Windows host —
//! install/uninstall fail fast with a clear error off-platform, which is
//! exactly what we assert here.

use assert_cmd::Command;
use std::io::Write;

#[test]
fn help_lists_mode_flag() {
    let output = Command::cargo_bin("gpii-service").unwrap().arg("--help").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("--mode"));
}

#[test]
fn version_flag_succeeds() {
    let output = Command::cargo_bin("gpii-service").unwrap().arg("--version").output().unwrap();
    assert!(output.status.success());
}

#[test]
fn missing_config_file_is_reported() {
    let output = Command::cargo_bin("gpii-service")
        .unwrap()
        .args(["--mode", "uninstall", "--config", "/nonexistent/gpii.toml"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read config file"));
}

#[test]
fn config_file_overlay_is_applied_before_dispatch() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, r#"service_name = "custom-gpii""#).unwrap();

    // uninstall dispatch reaches `ensure_elevated`/the service manager, which
    // on a non-Windows CI host bails with a clear "only supported on
    // Windows" error rather than panicking on the (now-custom) service name.
    let output = Command::cargo_bin("gpii-service")
        .unwrap()
        .args(["--mode", "uninstall", "--config", file.path().to_str().unwrap()])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
