use chrono::{DateTime, Utc};

use crate::{
    CycleStats, Effect, HandleRecord, Msg, RetrievalJob, SkipReason, SkippedRecord, TrackerState,
    VersionExcerpt,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: TrackerState, msg: Msg) -> (TrackerState, Vec<Effect>) {
    let effects = match msg {
        Msg::Restore(snapshot) => {
            state.restore(snapshot);
            Vec::new()
        }
        Msg::DetailsReceived {
            observed_at,
            records,
        } => apply_details(&mut state, observed_at, records),
    };

    (state, effects)
}

fn apply_details(
    state: &mut TrackerState,
    observed_at: DateTime<Utc>,
    records: Vec<HandleRecord>,
) -> Vec<Effect> {
    let mut stats = CycleStats {
        received: records.len(),
        ..CycleStats::default()
    };

    let mut skipped = Vec::new();
    let mut excerpts = Vec::with_capacity(records.len());
    for record in records {
        let built = match &record.details {
            None => Err(SkipReason::NoDetails),
            Some(details) => {
                VersionExcerpt::build(details, observed_at).map_err(SkipReason::Unparsable)
            }
        };
        match built {
            Ok(excerpt) => excerpts.push(excerpt),
            Err(reason) => skipped.push(SkippedRecord {
                handle: record.handle,
                reason,
            }),
        }
    }
    stats.parsed = excerpts.len();
    stats.skipped = skipped.len();

    let mut effects = Vec::new();
    for excerpt in excerpts {
        if !excerpt.supersedes(state.get(excerpt.handle())) {
            continue;
        }
        effects.push(Effect::EnqueueRetrieval(RetrievalJob::from(&excerpt)));
        state.put(excerpt);
    }
    stats.new_versions = effects.len();
    state.set_last_cycle(stats, skipped);

    effects
}
