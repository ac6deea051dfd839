//! Record merging.
//!
//! Upstream queries emit the same logical incident or alert several times.
//! Records sharing an identity collapse into one: samples are unioned and
//! deduplicated (no gap splitting yet), and mutable fields come from the
//! record holding the globally latest sample.

use crate::consolidator::dedup_samples;
use incident_timeline_core::series::TimelineRecord;
use std::collections::BTreeMap;
use tracing::debug;

/// Merge records by identity.
///
/// The last-writer-wins election is decided by data recency: the record
/// whose latest sample is newest supplies `silenced`, severity and the
/// other non-timeseries fields. Between equally recent records, the one
/// that arrived later wins. Output is ordered by identity.
pub fn merge_records<R: TimelineRecord>(records: Vec<R>) -> Vec<R> {
    let input_count = records.len();
    let mut groups: BTreeMap<R::Key, Vec<R>> = BTreeMap::new();
    for record in records {
        groups.entry(record.identity()).or_default().push(record);
    }

    let merged: Vec<R> = groups.into_values().filter_map(merge_group).collect();

    debug!(
        input = input_count,
        merged = merged.len(),
        "Merged records by identity"
    );
    merged
}

fn merge_group<R: TimelineRecord>(group: Vec<R>) -> Option<R> {
    // max_by_key keeps the last of equal maxima, so later arrivals win ties
    let winner_index = group
        .iter()
        .enumerate()
        .max_by_key(|(_, r)| r.last_timestamp())
        .map(|(i, _)| i)?;

    let mut winner = group[winner_index].clone();
    let mut all_samples = Vec::with_capacity(group.iter().map(|r| r.samples().len()).sum());

    for (i, record) in group.iter().enumerate() {
        all_samples.extend_from_slice(record.samples());
        if i != winner_index {
            winner.absorb(record);
        }
    }

    winner.set_samples(dedup_samples(all_samples));
    Some(winner)
}
