use chrono::{DateTime, Utc};

/// Timestamp component of artifact names, down to the microsecond.
const OBSERVED_FORMAT: &str = "%Y-%m-%d-%H-%M-%S%.6f";

/// `{handle}-{observed}-{version_code}.{ext}`
pub fn primary_artifact_name(
    handle: &str,
    observed_at: DateTime<Utc>,
    version_code: i64,
    extension: &str,
) -> String {
    format!(
        "{}-{}-{version_code}.{extension}",
        sanitize_component(handle),
        observed_at.format(OBSERVED_FORMAT)
    )
}

/// `{handle}-{observed}-{kind}-{version_code}.{ext}`
pub fn auxiliary_artifact_name(
    handle: &str,
    observed_at: DateTime<Utc>,
    kind: &str,
    version_code: i64,
    extension: &str,
) -> String {
    format!(
        "{}-{}-{}-{version_code}.{extension}",
        sanitize_component(handle),
        observed_at.format(OBSERVED_FORMAT),
        sanitize_component(kind)
    )
}

fn sanitize_component(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}
