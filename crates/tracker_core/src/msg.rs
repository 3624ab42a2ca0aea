use chrono::{DateTime, Utc};
use serde_json::Value;

/// One entry of a bulk details response, paired with the handle it was requested for.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleRecord {
    pub handle: String,
    /// Raw details; `None` when the catalog returned nothing for the handle.
    pub details: Option<Value>,
}

impl HandleRecord {
    pub fn new(handle: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            handle: handle.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Replace the in-memory state with what was loaded from disk.
    Restore(crate::StateSnapshot),
    /// A bulk details response arrived for the poll started at `observed_at`.
    DetailsReceived {
        observed_at: DateTime<Utc>,
        records: Vec<HandleRecord>,
    },
}
