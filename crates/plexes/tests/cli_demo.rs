#![cfg(feature = "cli")]

use std::process::{Command, Output};

fn demo(extra: &[&str]) -> (Output, serde_json::Value) {
    let output = Command::new(env!("CARGO_BIN_EXE_plexes"))
        .args(["--log-level", "error", "--format", "json", "demo", "--timeout", "5s"])
        .args(extra)
        .output()
        .expect("demo command should run");
    let report = serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "demo should print a json report ({err}); stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        )
    });
    (output, report)
}

fn peer<'a>(report: &'a serde_json::Value, label: &str) -> &'a serde_json::Value {
    report["peers"]
        .as_array()
        .expect("peers should be an array")
        .iter()
        .find(|peer| peer["label"] == label)
        .unwrap_or_else(|| panic!("peer {label} should be reported"))
}

#[test]
fn coupled_conversation_closes_both_peers_once() {
    let (output, report) = demo(&["--message", "hello", "--message", "again"]);
    assert!(output.status.success(), "demo should exit 0");

    let a = peer(&report, "a");
    let b = peer(&report, "b");
    assert_eq!(a["policy"], "half-duplex");
    assert_eq!(a["received"], serde_json::json!(["hello!", "again!"]));
    assert_eq!(b["received"], serde_json::json!(["hello", "again"]));
    for side in [a, b] {
        assert_eq!(side["state"], "closed");
        assert_eq!(side["input"], "closed");
        assert_eq!(side["output"], "closed");
        assert_eq!(side["closes"], 1);
        assert_eq!(side["errors"], 0);
    }
}

#[test]
fn independent_conversation_still_hangs_up_both_peers() {
    let (output, report) = demo(&["--independent"]);
    assert!(output.status.success(), "demo should exit 0");

    for label in ["a", "b"] {
        let side = peer(&report, label);
        assert_eq!(side["policy"], "full-duplex");
        assert_eq!(side["state"], "closed");
        assert_eq!(side["closes"], 1);
    }
}

#[test]
fn failed_conversation_errors_both_peers_with_one_reason() {
    let (output, report) = demo(&["--fail"]);
    assert!(output.status.success(), "demo should exit 0");

    for label in ["a", "b"] {
        let side = peer(&report, label);
        assert_eq!(side["state"], "errored");
        assert_eq!(side["reason"], "conversation aborted");
        assert_eq!(side["errors"], 1);
        assert_eq!(side["closes"], 0);
    }
}

#[test]
fn zero_timeout_is_a_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_plexes"))
        .args(["demo", "--timeout", "0s"])
        .output()
        .expect("demo command should run");
    assert_eq!(output.status.code(), Some(64));
}
