//! Tracker core: pure version-diff state machine, no IO.
mod effect;
mod excerpt;
mod msg;
mod state;
mod update;

pub use effect::Effect;
pub use excerpt::{
    parse_publish_date, ExcerptParseError, PersistedExcerpt, VersionExcerpt, PUBLISH_DATE_FORMAT,
};
pub use msg::{HandleRecord, Msg};
pub use state::{
    CycleStats, RetrievalJob, SkipReason, SkippedRecord, StateSnapshot, TrackerState,
};
pub use update::update;
