#![cfg(feature = "cli")]

use std::path::Path;
use std::process::{Command, Output};

fn handover(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_handover"))
        .args(args)
        .output()
        .expect("handover should run")
}

fn json_report(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("simulate should emit json")
}

#[test]
fn simulate_commits_the_builtin_scenario() {
    let output = handover(&["--format", "json", "simulate", "--chunk-size", "32"]);
    assert!(output.status.success(), "{output:?}");

    let report = json_report(&output);
    assert_eq!(report["outcome"], "committed");
    assert_eq!(report["primary_role"], "secondary");
    assert_eq!(report["secondary_role"], "primary");
    assert_eq!(report["records_sent"], report["records_received"]);
    assert_eq!(
        report["secondary_events"][0],
        serde_json::json!({"event": "succeeded", "role": "primary"})
    );
}

#[test]
fn simulate_reads_a_scenario_file() {
    let scenario = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/streaming.json");
    let output = handover(&[
        "--format",
        "json",
        "simulate",
        "--show-state",
        "--scenario",
        scenario.to_str().expect("utf-8 path"),
    ]);
    assert!(output.status.success(), "{output:?}");

    let report = json_report(&output);
    let links = &report["final_state"]["secondary"]["link_manager"]["links"];
    assert_eq!(links.as_array().map(Vec::len), Some(2));
}

#[test]
fn veto_exits_75() {
    let output = handover(&["--format", "json", "simulate", "--veto", "voice-call"]);
    assert_eq!(output.status.code(), Some(75));

    let report = json_report(&output);
    assert_eq!(report["outcome"], "vetoed");
    assert_eq!(report["vetoed_by"], serde_json::json!(["voice_call"]));
    assert_eq!(report["chunks"], 0);
}

#[test]
fn corrupt_stream_exits_60() {
    let output = handover(&["--format", "json", "simulate", "--corrupt"]);
    assert_eq!(output.status.code(), Some(60));

    let report = json_report(&output);
    assert_eq!(report["outcome"], "failed");
    assert_eq!(report["primary_role"], "primary");
    assert_eq!(
        report["secondary_events"][0],
        serde_json::json!({"event": "failed", "reason": "corrupt_stream"})
    );
}

#[test]
fn chunk_smaller_than_a_field_fails() {
    let output = handover(&["--format", "json", "simulate", "--chunk-size", "4"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(json_report(&output)["outcome"], "failed");
}

#[test]
fn address_sized_chunks_commit() {
    let output = handover(&["--format", "json", "simulate", "--chunk-size", "6"]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(json_report(&output)["outcome"], "committed");
}

#[test]
fn missing_scenario_is_a_usage_error() {
    let output = handover(&["simulate", "--scenario", "/nonexistent/handover.json"]);
    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/nonexistent/handover.json"));
}

#[test]
fn types_lists_registered_records() {
    let output = handover(&["--format", "json", "types"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let entries: serde_json::Value = serde_json::from_str(&stdout).expect("types should emit json");
    let names: Vec<&str> = entries
        .as_array()
        .expect("types should emit an array")
        .iter()
        .filter_map(|entry| entry["name"].as_str())
        .collect();
    assert!(names.contains(&"STREAM_DEVICE"));
    assert!(names.contains(&"VOICE_LINK"));
}

#[test]
fn version_reports_package_version() {
    let output = handover(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("handover {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn extended_version_emits_json_fields() {
    let output = handover(&["--format", "json", "version", "--extended"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let fields: serde_json::Value = serde_json::from_str(&stdout).expect("version should emit json");
    assert_eq!(fields["name"], "handover");
    assert_eq!(fields["default_max_chunk"], "256");
}
