use std::fmt;
use std::path::PathBuf;

use tracker_core::RetrievalJob;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogError {
    pub kind: FailureKind,
    pub message: String,
}

impl CatalogError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CatalogError {}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        Self::new(FailureKind::Io, err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    Unauthorized,
    HttpStatus(u16),
    Timeout,
    Decode,
    Network,
    Io,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::Unauthorized => write!(f, "unauthorized"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Decode => write!(f, "malformed response"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Io => write!(f, "disk error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalOutcome {
    pub files: Vec<PathBuf>,
    pub bytes_written: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalEvent {
    Started(RetrievalJob),
    Completed {
        job: RetrievalJob,
        result: Result<RetrievalOutcome, CatalogError>,
    },
}
