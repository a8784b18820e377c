//! Corruption recovery tests for the setwise binary.
//!
//! These tests verify the system can handle:
//! - Corrupted session snapshots
//! - Corrupted history and dashboard cache files
//! - Missing or invalid program day files

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("setwise"))
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

const DAY: &str = r#"{
    "id": 3,
    "name": "Legs",
    "exercises": [
        {"exerciseId": 7, "name": "Squat", "sets": 2, "reps": "5", "restSeconds": 90}
    ]
}"#;

#[test]
fn test_corrupted_snapshot_starts_fresh() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let day_path = temp_dir.path().join("day.json");
    fs::write(&day_path, DAY).unwrap();

    fs::create_dir_all(data_dir.join("sessions")).unwrap();
    let snapshot = data_dir.join("sessions/workout_day_3.json");
    fs::write(&snapshot, "{ invalid json }}}}").expect("Failed to write corrupted snapshot");

    cli()
        .arg("run")
        .arg(&day_path)
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--auto")
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Resuming").not());

    // Snapshot was replaced with a valid session
    let contents = fs::read_to_string(&snapshot).unwrap();
    let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(value["completedExerciseIds"], serde_json::json!([7]));
}

#[test]
fn test_status_ignores_corrupted_snapshot() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    fs::create_dir_all(data_dir.join("sessions")).unwrap();
    fs::write(data_dir.join("sessions/workout_day_3.json"), "").unwrap();

    cli()
        .arg("status")
        .arg("3")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved session"));
}

#[test]
fn test_corrupted_history_file() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    fs::create_dir_all(data_dir.join("history")).unwrap();
    fs::write(data_dir.join("history/workout_history.json"), "[{\"programDayId\": 1,")
        .expect("Failed to write corrupted history");

    cli()
        .arg("history")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Workouts: 0"));
}

#[test]
fn test_corrupted_dashboard_cache() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    fs::write(data_dir.join("dashboard_cache.json"), "not a cache").unwrap();

    cli()
        .arg("dashboard")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Source: LocalOnly"));
}

#[test]
fn test_missing_day_file() {
    let temp_dir = setup_test_dir();

    cli()
        .arg("run")
        .arg(temp_dir.path().join("nope.json"))
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--auto")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Io"));
}

#[test]
fn test_day_without_exercises_rejected() {
    let temp_dir = setup_test_dir();
    let day_path = temp_dir.path().join("empty.json");
    fs::write(&day_path, r#"{"id": 4, "name": "Rest", "exercises": []}"#).unwrap();

    cli()
        .arg("start")
        .arg(&day_path)
        .arg("--data-dir")
        .arg(temp_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no exercises"));

    assert!(!temp_dir.path().join("sessions/workout_day_4.json").exists());
}
