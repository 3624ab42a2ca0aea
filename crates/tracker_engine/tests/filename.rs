use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use tracker_engine::{auxiliary_artifact_name, primary_artifact_name};

#[test]
fn names_carry_microsecond_timestamp() {
    let observed =
        Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap() + chrono::Duration::microseconds(42);

    assert_eq!(
        primary_artifact_name("com.example", observed, 1200, "apk"),
        "com.example-2024-05-06-07-08-09.000042-1200.apk"
    );
    assert_eq!(
        auxiliary_artifact_name("com.example", observed, "patch", 1199, "obb"),
        "com.example-2024-05-06-07-08-09.000042-patch-1199.obb"
    );
}

#[test]
fn reattempts_with_same_version_get_distinct_names() {
    let first = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
    let second = first + chrono::Duration::microseconds(1);

    assert_ne!(
        primary_artifact_name("h", first, 1, "apk"),
        primary_artifact_name("h", second, 1, "apk")
    );
}

#[test]
fn path_hostile_characters_are_replaced() {
    let observed = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let name = primary_artifact_name("../evil/name", observed, 3, "apk");

    assert!(!name.contains('/'));
    assert!(name.starts_with("evil_name-"), "got {name}");

    let name = auxiliary_artifact_name("ok", observed, "", 3, "obb");
    assert!(name.contains("-unnamed-3.obb"), "got {name}");
}
