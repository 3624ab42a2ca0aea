use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Date format used by the catalog for publish dates, e.g. `Jan 5, 2024`.
pub const PUBLISH_DATE_FORMAT: &str = "%b %d, %Y";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExcerptParseError {
    #[error("missing or mistyped field `{0}`")]
    MissingField(&'static str),
    #[error("publish date `{value}` does not match the `Mon DD, YYYY` format")]
    InvalidDate { value: String },
}

/// Snapshot of one catalog entry's version state at the time it was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionExcerpt {
    handle: String,
    version: String,
    version_code: i64,
    published_at: DateTime<Utc>,
    observed_at: DateTime<Utc>,
}

impl VersionExcerpt {
    pub fn new(
        handle: impl Into<String>,
        version: impl Into<String>,
        version_code: i64,
        published_at: DateTime<Utc>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            handle: handle.into(),
            version: version.into(),
            version_code,
            published_at,
            observed_at,
        }
    }

    /// Builds an excerpt from a raw catalog details record.
    ///
    /// Expected shape:
    /// `{"docid": .., "details": {"appDetails": {"versionString": .., "versionCode": .., "uploadDate": ..}}}`.
    /// Nothing is returned unless every field is present and the date parses.
    pub fn build(raw: &Value, observed_at: DateTime<Utc>) -> Result<Self, ExcerptParseError> {
        let handle = raw
            .get("docid")
            .and_then(Value::as_str)
            .ok_or(ExcerptParseError::MissingField("docid"))?;
        let app_details = raw
            .get("details")
            .and_then(|details| details.get("appDetails"))
            .ok_or(ExcerptParseError::MissingField("details.appDetails"))?;
        let version = app_details
            .get("versionString")
            .and_then(Value::as_str)
            .ok_or(ExcerptParseError::MissingField(
                "details.appDetails.versionString",
            ))?;
        let version_code = app_details
            .get("versionCode")
            .and_then(Value::as_i64)
            .ok_or(ExcerptParseError::MissingField(
                "details.appDetails.versionCode",
            ))?;
        let upload_date = app_details
            .get("uploadDate")
            .and_then(Value::as_str)
            .ok_or(ExcerptParseError::MissingField("details.appDetails.uploadDate"))?;

        Ok(Self::new(
            handle,
            version,
            version_code,
            parse_publish_date(upload_date)?,
            observed_at,
        ))
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn version_code(&self) -> i64 {
        self.version_code
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// True when this excerpt should replace `prior` as the latest known version.
    pub fn supersedes(&self, prior: Option<&VersionExcerpt>) -> bool {
        match prior {
            None => true,
            Some(prior) => self.published_at > prior.published_at,
        }
    }
}

/// Parses a catalog publish date (`Jan 5, 2024`) as midnight UTC of that day.
pub fn parse_publish_date(text: &str) -> Result<DateTime<Utc>, ExcerptParseError> {
    NaiveDate::parse_from_str(text, PUBLISH_DATE_FORMAT)
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| ExcerptParseError::InvalidDate {
            value: text.to_string(),
        })
}

/// On-disk form of an excerpt; the handle is the key of the surrounding map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedExcerpt {
    pub version: String,
    pub version_code: i64,
    pub published_at: DateTime<Utc>,
    pub observed_at: DateTime<Utc>,
}

impl PersistedExcerpt {
    pub fn into_excerpt(self, handle: impl Into<String>) -> VersionExcerpt {
        VersionExcerpt::new(
            handle,
            self.version,
            self.version_code,
            self.published_at,
            self.observed_at,
        )
    }
}

impl From<&VersionExcerpt> for PersistedExcerpt {
    fn from(excerpt: &VersionExcerpt) -> Self {
        Self {
            version: excerpt.version.clone(),
            version_code: excerpt.version_code,
            published_at: excerpt.published_at,
            observed_at: excerpt.observed_at,
        }
    }
}
