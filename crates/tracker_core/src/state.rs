use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{ExcerptParseError, VersionExcerpt};

/// Handle → latest excerpt, as loaded from or written to durable storage.
pub type StateSnapshot = BTreeMap<String, VersionExcerpt>;

/// A queued retrieval for one newly observed version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalJob {
    pub handle: String,
    pub version_code: i64,
    pub observed_at: DateTime<Utc>,
}

impl From<&VersionExcerpt> for RetrievalJob {
    fn from(excerpt: &VersionExcerpt) -> Self {
        Self {
            handle: excerpt.handle().to_string(),
            version_code: excerpt.version_code(),
            observed_at: excerpt.observed_at(),
        }
    }
}

/// Counters for the most recent details response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleStats {
    pub received: usize,
    pub parsed: usize,
    pub skipped: usize,
    pub new_versions: usize,
}

/// Why a handle contributed nothing to the last details response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoDetails,
    Unparsable(ExcerptParseError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub handle: String,
    pub reason: SkipReason,
}

/// Latest version ever observed and scheduled, per tracked handle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackerState {
    latest: StateSnapshot,
    last_cycle: CycleStats,
    last_skipped: Vec<SkippedRecord>,
    dirty: bool,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: &str) -> Option<&VersionExcerpt> {
        self.latest.get(handle)
    }

    /// Overwrites the entry for the excerpt's handle and marks the state dirty.
    pub fn put(&mut self, excerpt: VersionExcerpt) {
        self.latest.insert(excerpt.handle().to_string(), excerpt);
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionExcerpt> {
        self.latest.values()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.latest.clone()
    }

    pub fn last_cycle(&self) -> CycleStats {
        self.last_cycle
    }

    /// Handles skipped by the most recent details response, in response order.
    pub fn last_skipped(&self) -> &[SkippedRecord] {
        &self.last_skipped
    }

    /// True when the in-memory map differs from its last durable flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_flushed(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn restore(&mut self, snapshot: StateSnapshot) {
        self.latest = snapshot;
        self.dirty = false;
    }

    pub(crate) fn set_last_cycle(&mut self, stats: CycleStats, skipped: Vec<SkippedRecord>) {
        self.last_cycle = stats;
        self.last_skipped = skipped;
    }
}
