use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const TRANSCRIPT: &str = r#"{
  "text": "...",
  "language": "fr",
  "segments": [
    {"id": 0, "start": 0.0, "end": 95.0, "text": "My grandfather opened the bakery."},
    {"id": 1, "start": 95.0, "end": 210.0, "text": "Every morning we kneaded the dough by hand."},
    {"id": 2, "start": 210.0, "end": 330.0, "text": "Later we moved to the village near Lyon."}
  ],
  "metadata": {"total_duration": 360.0}
}"#;

#[test]
fn missing_transcript_is_rejected() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("themalyzer")
        .unwrap()
        .arg(dir.path().join("absent.json"))
        .arg(dir.path().join("out.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("transcript.json");
    fs::write(&input, TRANSCRIPT).unwrap();
    Command::cargo_bin("themalyzer")
        .unwrap()
        .arg(&input)
        .arg(dir.path().join("out.json"))
        .args(["--max-segments", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_segments"));
}

#[test]
fn unreachable_service_still_writes_report() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("transcript.json");
    let output = dir.path().join("report").join("segments.json");
    fs::write(&input, TRANSCRIPT).unwrap();

    Command::cargo_bin("themalyzer")
        .unwrap()
        .arg(&input)
        .arg(&output)
        .args([
            "--endpoint",
            "http://127.0.0.1:9",
            "--retries",
            "0",
            "--timeout",
            "5",
            "--skip-model-check",
            "--include-transcript",
        ])
        .env("RUST_LOG", "warn")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 3 segment(s)"));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let segments = report["segments"].as_array().unwrap();
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[0]["start"], 0.0);
    assert_eq!(segments[2]["end"], 360.0);
    assert_eq!(segments[0]["title"], "Segment_1");
    assert_eq!(segments[0]["duration_label"], "2m00s");
    assert_eq!(report["flagged_ordinals"], serde_json::json!([1, 2, 3]));
    assert_eq!(report["analysis"]["failed"], 1);
    assert_eq!(report["transcript"]["segments"].as_array().unwrap().len(), 3);
}
