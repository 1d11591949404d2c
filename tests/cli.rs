use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

const SONG: &str = "[ti:Refrain]\n[ar:Someone]\n[00:00.00]Intro\n[00:05.00]First line\n[00:10.00]Second line\n";

fn lyrics_file(dir: &tempfile::TempDir, body: &str) -> String {
    let path = dir.path().join("song.lrc");
    fs::write(&path, body).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn test_lyrics_prints_lines_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = lyrics_file(&dir, SONG);
    cargo_bin_cmd!("songsync")
        .args(["lyrics", &path])
        .assert()
        .success()
        .stdout(predicate::str::contains("  [00:00.00] Intro\n  [00:05.00] First line\n"));
}

#[test]
fn test_lyrics_marks_active_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = lyrics_file(&dir, SONG);
    cargo_bin_cmd!("songsync")
        .args(["lyrics", &path, "--at", "0:07"])
        .assert()
        .success()
        .stdout(predicate::str::contains("> [00:05.00] First line"))
        .stdout(predicate::str::contains("  [00:10.00] Second line"));
}

#[test]
fn test_lyrics_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = lyrics_file(&dir, SONG);
    let output = cargo_bin_cmd!("songsync")
        .args(["lyrics", &path, "--json", "--at", "12"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["meta"]["title"], "Refrain");
    assert_eq!(doc["meta"]["artist"], "Someone");
    assert_eq!(doc["meta"]["offset_ms"], 0);
    let lines = doc["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1]["text"], "First line");
    assert_eq!(lines[1]["time"], 5.0);
    assert_eq!(lines[2]["active"], true);
    assert_eq!(lines[0]["active"], false);
}

#[test]
fn test_lyrics_without_timed_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = lyrics_file(&dir, "[ti:Nothing]\nplain text only\n");
    cargo_bin_cmd!("songsync")
        .args(["lyrics", &path])
        .assert()
        .success()
        .stdout(predicate::str::contains("No lyrics available"));
}

#[test]
fn test_lyrics_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.lrc");
    cargo_bin_cmd!("songsync")
        .args(["lyrics", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unable to load lyrics file"))
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_lyrics_rejects_bad_time() {
    cargo_bin_cmd!("songsync")
        .args(["lyrics", "song.lrc", "--at", "later"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected m:ss or seconds"));
}

#[test]
fn test_play_help_lists_options() {
    cargo_bin_cmd!("songsync")
        .args(["play", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--reconcile-ms"))
        .stdout(predicate::str::contains("--retry-attempts"))
        .stdout(predicate::str::contains("--lyrics"));
}
