mod common;

use std::fs;
use std::io::Write;

use chrono::{TimeZone, Utc};
use common::init_logging;
use pretty_assertions::assert_eq;
use tempfile::{NamedTempFile, TempDir};
use tracker_core::{TrackerState, VersionExcerpt};
use tracker_engine::{StateFile, StateFileError};

fn sample_state() -> TrackerState {
    let mut state = TrackerState::new();
    state.put(VersionExcerpt::new(
        "com.example.a",
        "1.2.3",
        123,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap() + chrono::Duration::nanoseconds(987_654_321),
    ));
    state.put(VersionExcerpt::new(
        "com.example.b",
        "beta",
        -1,
        Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2023, 12, 2, 0, 0, 0).unwrap(),
    ));
    state
}

#[test]
fn missing_file_is_a_fresh_start() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let (_file, snapshot) = StateFile::open(temp.path().join("persist/lastUpdates.json")).unwrap();
    assert!(snapshot.is_empty());
    assert!(temp.path().join("persist").is_dir());
}

#[test]
fn empty_file_is_a_fresh_start() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("lastUpdates.json");
    fs::write(&path, "  \n").unwrap();

    let (_file, snapshot) = StateFile::open(&path).unwrap();
    assert!(snapshot.is_empty());
}

#[test]
fn invalid_content_loads_as_empty() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("lastUpdates.json");
    fs::write(&path, "{ this is not json").unwrap();

    let (_file, snapshot) = StateFile::open(&path).unwrap();
    assert!(snapshot.is_empty());

    fs::write(&path, r#"{"x": {"version": "1"}}"#).unwrap();
    let (_file, snapshot) = StateFile::open(&path).unwrap();
    assert!(snapshot.is_empty());

    fs::write(&path, [0xff, 0xfe, 0x00, 0x7b]).unwrap();
    let (_file, snapshot) = StateFile::open(&path).unwrap();
    assert!(snapshot.is_empty());
}

#[test]
fn flush_then_open_round_trips_exactly() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("lastUpdates.json");
    let state = sample_state();

    let (file, _) = StateFile::open(&path).unwrap();
    assert_eq!(file.flush(&state).unwrap(), path);

    let (_file, snapshot) = StateFile::open(&path).unwrap();
    assert_eq!(snapshot, state.snapshot());
}

#[test]
fn persisted_format_is_keyed_by_handle() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("lastUpdates.json");
    let (file, _) = StateFile::open(&path).unwrap();
    file.flush(&sample_state()).unwrap();

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let entry = &json["com.example.a"];
    assert_eq!(entry["version"], "1.2.3");
    assert_eq!(entry["versionCode"], 123);
    assert_eq!(entry["publishedAt"], "2024-01-01T00:00:00Z");
    assert_eq!(entry["observedAt"], "2024-01-02T03:04:05.987654321Z");
}

#[test]
fn interrupted_flush_leaves_previous_content_readable() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("lastUpdates.json");
    let state = sample_state();
    let (file, _) = StateFile::open(&path).unwrap();
    file.flush(&state).unwrap();

    let mut next = state.clone();
    next.put(VersionExcerpt::new("com.example.c", "9", 9, Utc::now(), Utc::now()));
    let encoded = {
        let scratch = TempDir::new().unwrap();
        let (scratch_file, _) = StateFile::open(scratch.path().join("lastUpdates.json")).unwrap();
        fs::read(scratch_file.flush(&next).unwrap()).unwrap()
    };

    // Stop after half of the new content reached the temp file, before the rename.
    let mut pending = NamedTempFile::new_in(temp.path()).unwrap();
    pending.write_all(&encoded[..encoded.len() / 2]).unwrap();
    pending.as_file().sync_all().unwrap();

    let (_file, snapshot) = StateFile::open(&path).unwrap();
    assert_eq!(snapshot, state.snapshot());

    // Finishing the write and the rename exposes the new content in full.
    pending.write_all(&encoded[encoded.len() / 2..]).unwrap();
    pending.persist(&path).unwrap();
    let (_file, snapshot) = StateFile::open(&path).unwrap();
    assert_eq!(snapshot, next.snapshot());
}

#[test]
fn failed_flush_keeps_previous_content() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("persist");
    let path = dir.join("lastUpdates.json");
    let state = sample_state();
    let (file, _) = StateFile::open(&path).unwrap();
    file.flush(&state).unwrap();
    let before = fs::read(&path).unwrap();

    // Pull the directory out from under the writer.
    let moved = temp.path().join("moved");
    fs::rename(&dir, &moved).unwrap();
    fs::write(&dir, "now a file").unwrap();

    let mut next = state.clone();
    next.put(VersionExcerpt::new("c", "1", 1, Utc::now(), Utc::now()));
    let err = file.flush(&next).unwrap_err();
    assert!(matches!(err, StateFileError::Flush { .. }), "got {err:?}");
    assert_eq!(fs::read(moved.join("lastUpdates.json")).unwrap(), before);
}

#[test]
fn unreadable_state_path_is_fatal() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("lastUpdates.json");
    fs::create_dir(&path).unwrap();

    let err = StateFile::open(&path).unwrap_err();
    assert!(matches!(err, StateFileError::Open { .. }), "got {err:?}");
}
