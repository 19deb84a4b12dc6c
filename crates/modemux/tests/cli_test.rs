//! Integration tests for the `modemux` CLI binary.
//!
//! Each simulate scenario runs entirely against the in-process fake
//! radio, so these exercise the real binary end to end without any
//! device access.
#![allow(clippy::unwrap_used)]

use std::io::Write;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command for the `modemux` binary with env isolation.
fn modemux_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("modemux");
    cmd.env("HOME", "/tmp/modemux-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/modemux-cli-test-nonexistent")
        .env_remove("MODEMUX_CONFIG")
        .env_remove("MODEMUX_RECOVERY_DELAY_MS");
    cmd
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = modemux_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = String::from_utf8_lossy(&output.stderr);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    modemux_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("simulate").and(predicate::str::contains("config")),
    );
}

#[test]
fn test_unknown_scenario_is_rejected() {
    modemux_cmd()
        .args(["simulate", "no-such-scenario"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

// ── Config command ──────────────────────────────────────────────────

#[test]
fn test_config_prints_defaults() {
    modemux_cmd()
        .arg("config")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("recovery_delay_ms")
                .and(predicate::str::contains("2000")),
        );
}

#[test]
fn test_config_file_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "recovery_delay_ms = 125").unwrap();

    modemux_cmd()
        .args(["--config", file.path().to_str().unwrap(), "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("125"));
}

#[test]
fn test_config_json_output_parses() {
    let output = modemux_cmd()
        .args(["-o", "json", "config"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["graveyard_depth"], 3);
}

// ── Simulate scenarios ──────────────────────────────────────────────

#[test]
fn test_simulate_toggle_cycle_ends_disabled() {
    modemux_cmd()
        .args(["simulate", "toggle-cycle"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("manager added")
                .and(predicate::str::contains("role changed"))
                .and(predicate::str::contains("Primary"))
                .and(predicate::str::contains("state: Disabled")),
        );
}

#[test]
fn test_simulate_hotspot_emergency_leaves_hotspot_down() {
    let output = modemux_cmd()
        .args(["-o", "json", "simulate", "hotspot-emergency"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let dump: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    // The client manager survives the call; the hotspot does not come back.
    assert_eq!(dump["clients"].as_array().unwrap().len(), 1);
    assert!(dump["softaps"].as_array().unwrap().is_empty());
    assert!(
        dump["graveyard"]
            .as_array()
            .unwrap()
            .iter()
            .any(|t| t["kind"] == "SoftAp")
    );
}

#[test]
fn test_simulate_handover_promotes_candidate() {
    modemux_cmd()
        .args(["simulate", "handover"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("primary changed")
                .and(predicate::str::contains("SecondaryTransient")),
        );
}

#[test]
fn test_simulate_recovery_recreates_managers() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "recovery_delay_ms = 50").unwrap();

    let output = modemux_cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "-o",
            "json",
            "simulate",
            "recovery",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let dump: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(dump["state"], "Enabled");
    assert_eq!(dump["clients"].as_array().unwrap().len(), 1);
    assert_eq!(dump["softaps"].as_array().unwrap().len(), 1);
}

#[test]
fn test_simulate_softap_admission_caps_stations() {
    let output = modemux_cmd()
        .args(["-o", "json", "simulate", "softap-admission"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let dump: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let softaps = dump["softaps"].as_array().unwrap();
    assert_eq!(softaps.len(), 1);
    assert_eq!(softaps[0]["connected_stations"], 1);
}
