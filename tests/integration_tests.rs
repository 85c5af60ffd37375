//! Integration tests: CLI smoke tests and end-to-end replay scenarios.

mod common;

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde_json::Value;
use san_workload_monitor::daemon::publisher::read_state;
use san_workload_monitor::prelude::*;

/// Five quiet one-second windows at 1000..1005, then a burst of 40 creates and
/// 10 modifies on one path at 1005.
fn burst_trace() -> String {
    let mut body = String::new();
    for second in 0..5 {
        for i in 0..3 {
            let ts = 1_000.0 + f64::from(second) + f64::from(i) * 0.1;
            let _ = writeln!(body, "{}", common::event_line("/san/quiet", "modified", ts));
        }
    }
    for i in 0..40 {
        let ts = 1_005.0 + f64::from(i) * 0.01;
        let _ = writeln!(body, "{}", common::event_line("/san/hot", "created", ts));
    }
    for i in 0..10 {
        let ts = 1_005.5 + f64::from(i) * 0.01;
        let _ = writeln!(body, "{}", common::event_line("/san/hot", "modified", ts));
    }
    body
}

fn write_file(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, body).expect("write fixture");
    path.to_string_lossy().into_owned()
}

fn parse_json(result: &common::CmdResult) -> Value {
    serde_json::from_str(result.stdout.trim()).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}); log: {}",
            result.log_path.display()
        )
    })
}

// ──────────────────── CLI smoke ────────────────────

#[test]
fn help_command_prints_usage() {
    let home = tempfile::tempdir().unwrap();
    let result = common::run_cli_case("help_command_prints_usage", home.path(), &["--help"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: swm [OPTIONS] <COMMAND>"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn version_command_prints_version() {
    let home = tempfile::tempdir().unwrap();
    let result = common::run_cli_case("version_command_prints_version", home.path(), &["--version"]);
    assert!(result.status.success());
    assert!(result.stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn completions_emit_script() {
    let home = tempfile::tempdir().unwrap();
    let result = common::run_cli_case("completions_emit_script", home.path(), &["completions", "bash"]);
    assert!(result.status.success());
    assert!(result.stdout.contains("swm"));
}

#[test]
fn config_validate_reports_defaults_as_valid() {
    let home = tempfile::tempdir().unwrap();
    let result = common::run_cli_case(
        "config_validate_defaults",
        home.path(),
        &["--json", "config", "validate"],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let payload = parse_json(&result);
    assert_eq!(payload["valid"], Value::Bool(true));
    assert!(payload["hash"].as_str().is_some_and(|h| h.len() == 16));
}

#[test]
fn config_validate_rejects_bad_thresholds() {
    let home = tempfile::tempdir().unwrap();
    let config = write_file(
        home.path(),
        "bad.toml",
        "[thresholds]\nburst_intensity_multiplier = 0.5\n",
    );
    let result = common::run_cli_case(
        "config_validate_rejects_bad_thresholds",
        home.path(),
        &["--json", "--config", &config, "config", "validate"],
    );
    assert_eq!(result.status.code(), Some(1));
    let payload = parse_json(&result);
    assert_eq!(payload["valid"], Value::Bool(false));
    assert_eq!(payload["code"], Value::String("SWM-1001".to_string()));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let home = tempfile::tempdir().unwrap();
    let missing = home.path().join("nope.toml");
    let result = common::run_cli_case(
        "missing_explicit_config",
        home.path(),
        &["--config", &missing.to_string_lossy(), "config", "show"],
    );
    assert!(!result.status.success());
    assert!(result.stderr.contains("SWM-1002"), "log: {}", result.log_path.display());
}

#[test]
fn status_without_daemon_fails_cleanly() {
    let home = tempfile::tempdir().unwrap();
    let result = common::run_cli_case("status_without_daemon", home.path(), &["status"]);
    assert_eq!(result.status.code(), Some(2));
    assert!(result.stderr.contains("no daemon state"));
}

// ──────────────────── replay ────────────────────

#[test]
fn replay_detects_burst_independent_of_load() {
    let home = tempfile::tempdir().unwrap();
    let trace = write_file(home.path(), "burst.jsonl", &burst_trace());
    let result = common::run_cli_case(
        "replay_detects_burst",
        home.path(),
        &["--json", "replay", &trace, "--path", "/san/hot", "--path", "/san/none"],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let payload = parse_json(&result);

    assert_eq!(payload["decoded"], Value::from(65));
    let history = payload["snapshot"]["recent_history"].as_array().unwrap();
    assert_eq!(history.len(), 6);
    let last = &history[5];
    assert_eq!(last["read_count"], Value::from(40));
    assert_eq!(last["write_count"], Value::from(10));
    assert_eq!(last["is_burst"], Value::Bool(true));
    assert_eq!(last["is_high_load"], Value::Bool(false));
    assert_eq!(last["dominant_path"], Value::String("/san/hot".to_string()));
    for quiet in &history[..5] {
        assert_eq!(quiet["is_burst"], Value::Bool(false));
    }

    assert_eq!(payload["summary"]["burst_windows"], Value::from(1));
    assert_eq!(payload["summary"]["high_load_windows"], Value::from(0));

    let paths = payload["paths"].as_array().unwrap();
    assert_eq!(paths[0]["report"]["stats"]["is_burst"], Value::Bool(true));
    assert_eq!(paths[0]["report"]["stats"]["total_creates"], Value::from(40));
    assert!(paths[1]["report"].is_null());

    let hotspots = payload["snapshot"]["hotspot_paths"].as_array().unwrap();
    assert_eq!(hotspots.len(), 1);
    assert_eq!(hotspots[0]["path"], Value::String("/san/hot".to_string()));
}

#[test]
fn replay_counts_garbage_and_non_utf8_and_honors_configured_thresholds() {
    let home = tempfile::tempdir().unwrap();
    let config = write_file(
        home.path(),
        "swm.toml",
        "[thresholds]\nread_frequency_threshold = 5\n",
    );
    let mut body = String::new();
    for i in 0..6 {
        let _ = writeln!(
            body,
            "{}",
            common::event_line("/san/a", "created", 50.0 + f64::from(i) * 0.1)
        );
    }
    body.push_str("this is not json\n");
    body.push_str("{\"path\":\"/san/a\",\"kind\":\"exploded\",\"timestamp\":50.9}\n");
    let mut bytes = body.into_bytes();
    bytes.extend_from_slice(b"\xff\xfe stray bytes\n");
    bytes.extend_from_slice(common::event_line("/san/a", "created", 50.95).as_bytes());
    bytes.push(b'\n');
    let trace_path = home.path().join("load.jsonl");
    fs::write(&trace_path, bytes).expect("write fixture");
    let trace = trace_path.to_string_lossy().into_owned();

    let result = common::run_cli_case(
        "replay_configured_thresholds",
        home.path(),
        &["--json", "--config", &config, "replay", &trace],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let payload = parse_json(&result);

    assert_eq!(payload["undecodable"], Value::from(2));
    let counters = &payload["snapshot"]["counters"];
    assert_eq!(counters["dropped_malformed"], Value::from(3));
    assert_eq!(counters["events_accepted"], Value::from(7));
    let history = payload["snapshot"]["recent_history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["is_high_load"], Value::Bool(true));
}

#[test]
fn replay_from_stdin_defaults_to_json_when_piped() {
    let home = tempfile::tempdir().unwrap();
    let result = common::run_cli_case_with_stdin(
        "replay_stdin_piped",
        home.path(),
        &["--no-color", "replay", "-"],
        Some(&burst_trace()),
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let payload = parse_json(&result);
    assert_eq!(payload["command"], Value::String("replay".to_string()));
}

// ──────────────────── daemon ────────────────────

#[test]
fn daemon_publishes_state_readable_by_status() {
    let home = tempfile::tempdir().unwrap();
    let state_file = home.path().join("state.json");
    let log_file = home.path().join("activity.jsonl");
    let config = write_file(
        home.path(),
        "swm.toml",
        &format!(
            "[engine]\ntick_interval_ms = 5\nsnapshot_interval_ms = 10\n\n[paths]\nstate_file = \"{}\"\njsonl_log = \"{}\"\n",
            state_file.display(),
            log_file.display()
        ),
    );
    let now = san_workload_monitor::monitor::engine::now_secs();
    let mut body = String::new();
    for i in 0..20 {
        let _ = writeln!(
            body,
            "{}",
            common::event_line(&format!("/san/d{}", i % 4), "modified", now)
        );
    }

    let daemon = common::run_cli_case_with_stdin(
        "daemon_stdin",
        home.path(),
        &["--json", "--config", &config, "daemon"],
        Some(&body),
    );
    assert!(daemon.status.success(), "log: {}", daemon.log_path.display());
    let report = parse_json(&daemon);
    assert_eq!(report["reason"], Value::String("sources exhausted".to_string()));
    let counters = &report["counters"];
    let accepted = counters["events_accepted"].as_u64().unwrap();
    let late = counters["dropped_late"].as_u64().unwrap();
    assert_eq!(accepted + late, 20);

    let state = read_state(&state_file).expect("daemon wrote state file");
    assert!(!state.snapshot.monitoring_active);
    assert_eq!(state.snapshot.counters.events_accepted, accepted);

    let status = common::run_cli_case(
        "status_after_daemon",
        home.path(),
        &["--json", "status", "--state-file", &state_file.to_string_lossy()],
    );
    assert!(status.status.success(), "log: {}", status.log_path.display());
    let payload = parse_json(&status);
    assert_eq!(payload["command"], Value::String("status".to_string()));
    assert_eq!(payload["stale"], Value::Bool(false));

    let log = fs::read_to_string(&log_file).unwrap();
    assert!(log.lines().count() >= 2);
}

// ──────────────────── library end-to-end ────────────────────

#[test]
fn engine_snapshot_matches_history_and_summary() {
    let config = Config::default();
    let engine = WorkloadEngine::starting_at(&config, 1_000.0);
    engine.start();
    for line in burst_trace().lines() {
        let raw: RawEvent = serde_json::from_str(line).unwrap();
        assert!(engine.notify(&raw).is_ok());
    }
    engine.tick_at(1_006.0);

    let snapshot = engine.snapshot();
    assert!(snapshot.monitoring_active);
    assert_eq!(snapshot.recent_history.len(), 6);
    assert!(snapshot.is_alerting());
    assert_eq!(snapshot.total_paths_monitored, 2);

    let summary = engine.summary(6);
    assert_eq!(summary.windows_analyzed, 6);
    assert_eq!(summary.total_writes, 25);
    assert_eq!(summary.total_reads, 40);
    assert_eq!(summary.burst_windows, 1);

    let history = engine.history(2);
    assert_eq!(history.len(), 2);
    assert!(history[0].start_time < history[1].start_time);

    assert!(engine.stats_for("/san/none").is_none());
    let quiet = engine.stats_for("/san/quiet").unwrap();
    assert_eq!(quiet.total_modifications, 15);
    assert!(!quiet.is_hotspot());
}
